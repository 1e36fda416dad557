use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use std::{path::PathBuf, sync::Arc};

use crate::config::{self, Config};
use crate::covers::CoverExtractor;
use crate::domain::{
    content_id::ContentId,
    track::{AudioBlob, NewTrack, TrackId},
};
use crate::http::server::HttpServer;
use crate::ingest::Ingestor;
use crate::remote::RemoteBlobClient;
use crate::storage::db::i64_seconds_to_local_time;
use crate::storage::operations::Storage;
use crate::storage::{self, SharedStorage};

#[derive(Parser)]
#[command(name = "blobdeck")]
#[command(version = "0.1")]
#[command(about = "Audio library backed by a remote blob store")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server streaming the library
    Serve,
    /// Register an uploaded audio blob and extract its cover
    Ingest {
        /// Short-lived handle used to fetch the audio
        #[arg(long)]
        file_id: String,
        /// Stable identifier of the audio content
        #[arg(long)]
        unique_id: String,
        /// Handle of the thumbnail the store attached to the upload
        #[arg(long)]
        thumb_file_id: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        /// Duration in seconds
        #[arg(long, default_value_t = 0)]
        duration: u32,
        /// Uploader id
        #[arg(long, default_value_t = 0)]
        user: i64,
    },
    /// List registered tracks
    List,
    /// Remove a track and its playlist memberships
    Delete { id: TrackId },
    /// Retry cover extraction for a track
    Cover { id: TrackId },
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let path = cli.config.to_string_lossy();
    let cfg = Config::load(&path)?;

    match cli.command {
        Commands::Serve => {
            let storage = open_storage(cfg.database)?;
            let client = Arc::new(RemoteBlobClient::new(&cfg.upstream)?);

            let http_server =
                HttpServer::new(storage, client, cfg.covers.dir, cfg.http, cfg.public);

            info!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::Ingest {
            file_id,
            unique_id,
            thumb_file_id,
            title,
            artist,
            duration,
            user,
        } => {
            let ingestor = ingestor(open_storage(cfg.database)?, &cfg.upstream, &cfg.covers)?;

            let track = ingestor.ingest(NewTrack {
                blob: AudioBlob {
                    blob_id: file_id,
                    thumbnail_blob_id: thumb_file_id,
                },
                content_id: ContentId::new(unique_id),
                title,
                artist,
                duration,
                user_id: user,
            })?;

            println!(
                "Registered track {}: {} - {}",
                track.id, track.metadata.artist, track.metadata.title
            );
            match &track.cover_path {
                Some(path) => println!("  cover: {}", path.to_string_lossy()),
                None => println!("  no cover found"),
            }
        }

        Commands::List => {
            let storage = Storage::new(cfg.database)?;

            for track in storage.list_tracks()? {
                println!(
                    "[{}] {} - {} ({}s){}",
                    track.id,
                    track.metadata.artist,
                    track.metadata.title,
                    track.metadata.duration,
                    if track.is_favorite { " *" } else { "" }
                );
                println!(
                    "    added {}",
                    i64_seconds_to_local_time(track.added_at)?.format("%Y-%m-%d %H:%M")
                );
                if let Some(path) = &track.cover_path {
                    println!("    cover: {}", path.to_string_lossy());
                }
            }
        }

        Commands::Delete { id } => {
            let mut storage = Storage::new(cfg.database)?;
            if storage.delete_track(id)? {
                println!("Track {id} deleted");
            } else {
                println!("Track {id} not found");
            }
        }

        Commands::Cover { id } => {
            let ingestor = ingestor(open_storage(cfg.database)?, &cfg.upstream, &cfg.covers)?;

            match ingestor.refresh_cover(id)? {
                Some(path) => println!("Cover for track {id}: {}", path.to_string_lossy()),
                None => println!("No cover found for track {id}"),
            }
        }
    }

    Ok(())
}

fn open_storage(db: config::Database) -> anyhow::Result<SharedStorage> {
    let storage = Storage::new(db).context("Failed to initialize storage")?;
    Ok(storage::shared(storage))
}

fn ingestor(
    storage: SharedStorage,
    upstream: &config::UpstreamConfig,
    covers_config: &config::CoversConfig,
) -> anyhow::Result<Ingestor> {
    let client = Arc::new(RemoteBlobClient::new(upstream)?);
    let covers = CoverExtractor::new(client, covers_config).with_context(|| {
        format!(
            "Failed to create cover dir {}",
            covers_config.dir.to_string_lossy()
        )
    })?;
    Ok(Ingestor::new(storage, covers))
}
