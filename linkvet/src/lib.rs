pub mod handlers;

pub use handlers::{
    CheckOverrides, ExitStatus, build_config, format_extraction, parse_domain_interval,
};
