pub mod assets;
pub mod config;
pub mod metadata;
pub mod render;
pub mod thumbnail;

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate serde_derive;

use assets::{HttpAvatarSource, HttpFetcher};
use config::Config;
use metadata::HttpVideoSearch;
use thumbnail::Generator;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt::init();

    info!("nowplaying {} ({}) starting", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let mut args = std::env::args().skip(1);
    let video_id = match args.next() {
        Some(id) => id,
        None => {
            eprintln!("usage: nowplaying <video-id> [requester-id]");
            std::process::exit(2);
        }
    };
    let requester_id = args.next();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::new();
    let search = HttpVideoSearch::new(client.clone(), config.search_api.clone());
    let avatars = HttpAvatarSource::new(client.clone(), config.avatar_api.clone());

    let generator = Generator::new(
        Box::new(HttpFetcher::new(client)),
        config,
        Box::new(search),
        Box::new(avatars),
    );

    let out = generator.get_thumb(&video_id, requester_id.as_deref()).await;
    println!("{}", out);
}
