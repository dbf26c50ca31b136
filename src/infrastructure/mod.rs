//! 基础设施层：日志等横切关注点

pub mod logging;
