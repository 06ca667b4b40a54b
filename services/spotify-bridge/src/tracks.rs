//! Web API response shapes and the slimmer shapes the bridge returns
//!
//! Only the fields the client renders are kept. Episodes in the player and
//! queue have no album or artists, so those fields default to empty.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub album: Option<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
}

/// `GET /search`
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub tracks: Paging<SpotifyTrack>,
}

/// `GET /me/player/currently-playing`
#[derive(Debug, Deserialize)]
pub struct CurrentlyPlaying {
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<SpotifyTrack>,
}

/// `GET /me/player/queue`
#[derive(Debug, Deserialize)]
pub struct QueueResponse {
    pub currently_playing: Option<SpotifyTrack>,
    #[serde(default)]
    pub queue: Vec<SpotifyTrack>,
}

/// Track as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Largest album image; Spotify lists images widest first
    pub image: Option<String>,
    pub uri: String,
    pub duration_ms: u64,
}

impl From<SpotifyTrack> for Track {
    fn from(track: SpotifyTrack) -> Self {
        let (album, image) = match track.album {
            Some(album) => {
                let image = album.images.into_iter().next().map(|i| i.url);
                (Some(album.name), image)
            }
            None => (None, None),
        };
        Self {
            id: track.id,
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album,
            image,
            uri: track.uri,
            duration_ms: track.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NowPlaying {
    pub playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
}

impl NowPlaying {
    pub fn idle() -> Self {
        Self {
            playing: false,
            progress_ms: None,
            track: None,
        }
    }
}

impl From<CurrentlyPlaying> for NowPlaying {
    fn from(current: CurrentlyPlaying) -> Self {
        Self {
            playing: current.is_playing,
            progress_ms: current.progress_ms,
            track: current.item.map(Track::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Queue {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
}

impl From<QueueResponse> for Queue {
    fn from(response: QueueResponse) -> Self {
        Self {
            current: response.currently_playing.map(Track::from),
            queue: response.queue.into_iter().map(Track::from).collect(),
        }
    }
}
