use slog::Drain;

/// Root logger writing human readable lines to stdout through an async drain. Components never
/// create their own root; they get a child of this one handed to them.
pub fn stdout_root_logger(name: &'static str) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("app" => name))
}

/// Logger that drops everything. Handy for tests and embedders that bring no logging.
pub fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
