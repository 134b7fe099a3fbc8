pub mod config_file;
pub mod param_file;
pub mod sql_template;
pub mod sqlx_session;
