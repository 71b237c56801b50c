use taskminder_app::app::{run, AppConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid Taskminder configuration: {err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(config).await {
        eprintln!("Failed to start Taskminder: {err:#}");
        std::process::exit(1);
    }
}
