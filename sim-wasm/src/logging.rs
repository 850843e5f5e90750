use log::LevelFilter;

/// Initializes the global logger.
///
/// When `verbose` is `true`, debug messages are printed. Otherwise only
/// info level and above are shown. Native builds log through `env_logger`
/// (so `RUST_LOG` still applies); browser builds write to the dev-tools
/// console.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    install(level);
}

#[cfg(not(target_arch = "wasm32"))]
fn install(level: LevelFilter) {
    use env_logger::{Builder, Env};

    let env = Env::default().default_filter_or(level.to_string());
    let mut builder = Builder::from_env(env);

    // Every `Aquarium::new` lands here; the first logger installed wins.
    if builder.try_init().is_err() {
        log::debug!("logger already installed; keeping it");
    }
}

#[cfg(target_arch = "wasm32")]
fn install(level: LevelFilter) {
    static LOGGER: console::ConsoleLogger = console::ConsoleLogger;

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(target_arch = "wasm32")]
mod console {
    use log::{Level, Log, Metadata, Record};
    use wasm_bindgen::JsValue;

    pub struct ConsoleLogger;

    impl Log for ConsoleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }

            let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
            match record.level() {
                Level::Error => web_sys::console::error_1(&line),
                Level::Warn => web_sys::console::warn_1(&line),
                Level::Info => web_sys::console::info_1(&line),
                Level::Debug | Level::Trace => web_sys::console::debug_1(&line),
            }
        }

        fn flush(&self) {}
    }
}
