//! Gateway that lets third-party chat clients reach the Anthropic Messages
//! and OpenAI Responses APIs as if they were the official coding CLIs.

pub mod adapters;
pub mod config;
pub mod error;
pub mod formats;
pub mod forward;
pub mod logger;
pub mod server;
pub mod session;
pub mod transform;

/// Log panics through the logger before the default hook runs.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        logger::error(
            "panic",
            &format!("PANIC occurred: message='{}', location='{}'", message, location),
        );
        default_hook(panic_info);
    }));
}
