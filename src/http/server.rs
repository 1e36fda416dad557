use log::info;
use rouille::{Request, Response, ResponseBody};
use serde::{Deserialize, Serialize};
use std::{fs::File, io, path::PathBuf, sync::Arc};

use crate::{
    config::{HttpConfig, PublicEndpoint},
    domain::track::{Track, TrackId},
    http::error::ApiError,
    proxy::{ProxiedStream, StreamProxy},
    public_endpoint::{cover_url, stream_url},
    remote::RemoteBlobClient,
    storage::{self, SharedStorage, error::StorageError, operations::Membership},
};

pub struct HttpServer {
    storage: SharedStorage,
    proxy: StreamProxy,
    covers_dir: PathBuf,
    public: PublicEndpoint,
    pub config: HttpConfig,
}

impl HttpServer {
    pub fn new(
        storage: SharedStorage,
        client: Arc<RemoteBlobClient>,
        covers_dir: PathBuf,
        config: HttpConfig,
        public: PublicEndpoint,
    ) -> Self {
        let proxy = StreamProxy::new(Arc::clone(&storage), client, config.stream_chunk_bytes);
        Self {
            storage,
            proxy,
            covers_dir,
            public,
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (GET) (/stream/{id: String}) => {
                respond(self.handle_stream(&id, request))
            },
            (GET) (/covers/{name: String}) => {
                respond(self.handle_cover(&name))
            },
            (GET) (/api/tracks) => {
                respond(self.handle_list_tracks())
            },
            (GET) (/api/play) => {
                respond(self.handle_play(request))
            },
            (POST) (/api/favorite) => {
                respond(self.handle_favorite(request))
            },
            (POST) (/api/delete) => {
                respond(self.handle_delete(request))
            },
            (GET) (/api/playlists) => {
                respond(self.handle_list_playlists())
            },
            (POST) (/api/playlists) => {
                respond(self.handle_create_playlist(request))
            },
            (POST) (/api/playlists/add) => {
                respond(self.handle_add_to_playlist(request))
            },
            (GET) (/api/playlists/tracks) => {
                respond(self.handle_playlist_tracks(request))
            },
            _ => Response::empty_404()
        );

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    /// relays the track from upstream, forwarding the listener's `Range`
    fn handle_stream(&self, id: &str, request: &Request) -> Result<Response, ApiError> {
        let stream = self.proxy.handle(id, request.header("Range"))?;
        Ok(stream_response(stream))
    }

    fn handle_cover(&self, name: &str) -> Result<Response, ApiError> {
        let not_found = || ApiError::NotFound(format!("cover {name} not found"));

        // only plain file names inside the cache directory
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(not_found());
        }

        let path = self.covers_dir.join(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StorageError::Fs(e).into()),
        };
        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        Ok(Response::from_file(mime, file).with_public_cache(24 * 60 * 60))
    }

    fn handle_list_tracks(&self) -> Result<Response, ApiError> {
        let tracks = storage::lock(&self.storage)?.list_tracks()?;
        Ok(Response::json(&self.track_responses(&tracks)))
    }

    fn handle_play(&self, request: &Request) -> Result<Response, ApiError> {
        let track_id: TrackId = query_id(request, "track_id")?;
        storage::lock(&self.storage)?.get_track(track_id)?;

        Ok(Response::json(&PlayResponse {
            url: stream_url(&self.public, track_id),
        }))
    }

    fn handle_favorite(&self, request: &Request) -> Result<Response, ApiError> {
        let body: FavoriteRequest = json_body(request)?;
        storage::lock(&self.storage)?.set_favorite(body.track_id, body.is_favorite)?;
        Ok(Response::json(&StatusResponse::ok()))
    }

    fn handle_delete(&self, request: &Request) -> Result<Response, ApiError> {
        let body: DeleteRequest = json_body(request)?;
        if !storage::lock(&self.storage)?.delete_track(body.track_id)? {
            return Err(StorageError::TrackNotFound(body.track_id).into());
        }
        info!("deleted track {}", body.track_id);
        Ok(Response::json(&StatusResponse::ok()))
    }

    fn handle_list_playlists(&self) -> Result<Response, ApiError> {
        let playlists = storage::lock(&self.storage)?.list_playlists()?;
        Ok(Response::json(
            &playlists
                .into_iter()
                .map(|p| PlaylistResponse {
                    id: p.id,
                    title: p.title,
                    count: p.track_count,
                })
                .collect::<Vec<_>>(),
        ))
    }

    fn handle_create_playlist(&self, request: &Request) -> Result<Response, ApiError> {
        let body: CreatePlaylistRequest = json_body(request)?;
        let title = body.title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("playlist title is empty".into()));
        }

        let id = storage::lock(&self.storage)?.create_playlist(title, body.user_id)?;
        Ok(Response::json(&StatusResponse {
            status: "ok",
            id: Some(id),
        }))
    }

    fn handle_add_to_playlist(&self, request: &Request) -> Result<Response, ApiError> {
        let body: AddToPlaylistRequest = json_body(request)?;
        let membership =
            storage::lock(&self.storage)?.add_to_playlist(body.playlist_id, body.track_id)?;

        Ok(Response::json(&StatusResponse {
            status: match membership {
                Membership::Added => "ok",
                Membership::AlreadyPresent => "exists",
            },
            id: None,
        }))
    }

    fn handle_playlist_tracks(&self, request: &Request) -> Result<Response, ApiError> {
        let playlist_id = query_id(request, "playlist_id")?;
        let tracks = storage::lock(&self.storage)?.playlist_tracks(playlist_id)?;
        Ok(Response::json(&self.track_responses(&tracks)))
    }

    fn track_responses(&self, tracks: &[Track]) -> Vec<TrackResponse> {
        tracks
            .iter()
            .map(|t| TrackResponse::from_domain(t, &self.public))
            .collect()
    }
}

fn respond(result: Result<Response, ApiError>) -> Response {
    match result {
        Ok(r) => r,
        Err(e) => e.into_response(),
    }
}

/// Mirrors the upstream status and headers; the body is pulled from
/// upstream only as fast as the listener reads it.
fn stream_response(stream: ProxiedStream) -> Response {
    let ProxiedStream {
        status,
        headers,
        content_length,
        body,
    } = stream;

    let data = match content_length.and_then(|len| usize::try_from(len).ok()) {
        Some(len) => ResponseBody::from_reader_and_size(body, len),
        None => ResponseBody::from_reader(body),
    };

    Response {
        status_code: status,
        headers: headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
        data,
        upgrade: None,
    }
}

fn query_id(request: &Request, name: &str) -> Result<i64, ApiError> {
    let value = request
        .get_param(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name}")))?;
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {value}")))
}

fn json_body<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, ApiError> {
    rouille::input::json_input(request)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

#[derive(Serialize, Deserialize)]
struct TrackResponse {
    id: TrackId,
    title: String,
    artist: String,
    duration: u32,
    cover_url: Option<String>,
    is_favorite: bool,
}

impl TrackResponse {
    fn from_domain(track: &Track, public: &PublicEndpoint) -> Self {
        Self {
            id: track.id,
            title: track.metadata.title.clone(),
            artist: track.metadata.artist.clone(),
            duration: track.metadata.duration,
            cover_url: cover_url(public, track.cover_path.as_deref()),
            is_favorite: track.is_favorite,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PlayResponse {
    url: String,
}

#[derive(Serialize, Deserialize)]
struct PlaylistResponse {
    id: i64,
    title: String,
    count: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            id: None,
        }
    }
}

#[derive(Deserialize)]
struct FavoriteRequest {
    track_id: TrackId,
    is_favorite: bool,
}

#[derive(Deserialize)]
struct DeleteRequest {
    track_id: TrackId,
}

#[derive(Deserialize)]
struct CreatePlaylistRequest {
    title: String,
    #[serde(default)]
    user_id: i64,
}

#[derive(Deserialize)]
struct AddToPlaylistRequest {
    playlist_id: i64,
    track_id: TrackId,
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
