use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON logs on stderr so stdout stays free for the schedule.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,good_lp=warn,microlp=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();
}
