//! Installs a panic hook that logs through `tracing` instead of `eprintln!`,
//! so a task panic surfaces in the same structured log stream as everything
//! else. Each connection/processor task is still isolated by `tokio::spawn`'s
//! own unwind boundary; this hook only changes how the panic is reported.

use std::panic;

pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|location| location.to_string())
            .unwrap_or_else(|| "unknown location".to_string());
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        tracing::error!(%location, %message, "task panicked");
        default_hook(info);
    }));
}
