use std::panic;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `KE_LOG_DIR` / `KE_LOG_INCLUDE_BACKTRACE` から読むログ設定
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    pub log_dir: Option<PathBuf>,
    pub include_backtrace: bool,
}

impl LoggingSettings {
    pub fn from_env() -> Self {
        Self {
            log_dir: std::env::var_os("KE_LOG_DIR").map(PathBuf::from),
            include_backtrace: std::env::var("KE_LOG_INCLUDE_BACKTRACE")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// panic を tracing に流す。プロセスにつき 1 回だけ設定される
pub fn install_tracing_panic_hook(app_name: &'static str, settings: &LoggingSettings) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    let include_backtrace = settings.include_backtrace;

    INSTALLED.get_or_init(|| {
        let default_hook = panic::take_hook();

        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic payload not string".into());

            tracing::error!(
                application = app_name,
                location = location.as_deref().unwrap_or("unknown"),
                panic_message = %message,
                "panic captured"
            );

            if include_backtrace {
                default_hook(info);
            }
        }));
    });
}

fn rotating_file_writer(app_name: &'static str, dir: &PathBuf) -> Option<BoxMakeWriter> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("failed to create KE_LOG_DIR ({err}); logging to stdout");
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(BoxMakeWriter::new(non_blocking))
}

/// tracing subscriber を初期化する
///
/// `KE_LOG_DIR` があれば `<dir>/<app>.log` に日次ローテーションで書き出し、
/// なければ stdout。フィルタは `RUST_LOG`（未設定なら info）。
pub fn init_tracing_subscriber(app_name: &'static str, settings: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let writer = settings
        .log_dir
        .as_ref()
        .and_then(|dir| rotating_file_writer(app_name, dir));

    match writer {
        Some(writer) => {
            let _ = builder.with_writer(writer).try_init();
        }
        None => {
            let _ = builder.try_init();
        }
    }
}
