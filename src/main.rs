use logcentral::app;

fn main() {
    let args = app::parse();

    let config = app::init_config(&args);

    if args.test_config {
        println!("configuration OK: {}", args.config_file);
        std::process::exit(0);
    }

    app::init_logging(&args);
    app::install_panic_hook();

    if let Err(error) = app::run_server(config) {
        tracing::error!(%error, "server exited with error");
        std::process::exit(exitcode::SOFTWARE);
    }
}
