use kotak_suara::db::Database;
use kotak_suara::stats;
use log::error;

/// Admin view from the command line: open the ballot store and print the
/// aggregated, ranked statistics as JSON.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database = match Database::new().await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let statistics = match stats::voting_statistics(&database).await {
        Ok(statistics) => statistics,
        Err(e) => {
            error!("Failed to compute voting statistics: {}", e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&statistics) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to render statistics: {}", e);
            std::process::exit(1);
        }
    }
}
