use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RemoteSource;
use crate::{
    error::{RemoteError, RemoteResult},
    models::{ActorDetail, CastMember, Genre, Movie, RemoteFilter},
};

/// Client for the catalog REST API (`/api/movies/`, `/api/genres/`, `/api/actors/`).
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    media_base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, base_url: String, media_base_url: String, rps: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::direct(quota));
        Self { client, base_url, media_base_url, limiter }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<T> {
        self.get_optional(path, query).await?.ok_or(RemoteError::Status(404))
    }

    /// Like [`get_json`](Self::get_json) but maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RemoteResult<Option<T>> {
        self.limiter.until_ready().await;

        debug!(path = %path, "catalog request");
        let resp = self.client.get(self.url(path)).query(query).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        Ok(Some(resp.json().await?))
    }

    async fn fetch_movies(&self, filter: &RemoteFilter) -> RemoteResult<Vec<Movie>> {
        let mut query = vec![
            ("page", "1".to_string()),
            ("ordering", filter.ordering.as_ordering().to_string()),
        ];
        if let Some(genre_id) = filter.genre_id {
            query.push(("genre", genre_id.to_string()));
        }
        if let Some(actor_id) = filter.actor_id {
            query.push(("actor", actor_id.to_string()));
        }
        if let Some(year) = filter.year {
            query.push(("year", year.to_string()));
        }
        if let Some(min_rating) = filter.min_rating {
            query.push(("min_rating", min_rating.to_string()));
        }
        if let Some(text) = filter.text.as_deref().filter(|t| !t.trim().is_empty()) {
            query.push(("search", text.to_string()));
        }

        let page: MoviesPage = self.get_json("api/movies/", &query).await?;
        Ok(self.movies(page.results))
    }

    fn movies(&self, dtos: Vec<MovieDto>) -> Vec<Movie> {
        dtos.into_iter().map(|dto| dto.into_movie(&self.media_base_url)).collect()
    }
}

#[async_trait]
impl RemoteSource for CatalogClient {
    async fn popular_movies(&self) -> RemoteResult<Vec<Movie>> {
        self.fetch_movies(&RemoteFilter::default()).await
    }

    async fn movie_details(&self, id: i32) -> RemoteResult<Option<Movie>> {
        let dto: Option<MovieDto> = self.get_optional(&format!("api/movies/{id}/"), &[]).await?;
        Ok(dto.map(|dto| dto.into_movie(&self.media_base_url)))
    }

    async fn movie_cast(&self, id: i32) -> RemoteResult<Vec<CastMember>> {
        let cast: Vec<CastDto> = self.get_json(&format!("api/movies/{id}/cast/"), &[]).await?;
        Ok(cast.into_iter().map(|dto| dto.into_cast_member(&self.media_base_url)).collect())
    }

    async fn search_movies(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> RemoteResult<Vec<Movie>> {
        let filter = RemoteFilter { text: Some(text.to_string()), ..Default::default() };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
            result = self.fetch_movies(&filter) => result,
        }
    }

    async fn genres(&self) -> RemoteResult<Vec<Genre>> {
        let genres: Vec<GenreDto> = self.get_json("api/genres/", &[]).await?;
        Ok(genres.into_iter().map(|g| Genre { id: g.id, name: g.name }).collect())
    }

    async fn movies_filtered(&self, filter: &RemoteFilter) -> RemoteResult<Vec<Movie>> {
        self.fetch_movies(filter).await
    }

    async fn actor_details(&self, id: i32) -> RemoteResult<Option<ActorDetail>> {
        let dto: Option<ActorDetailDto> =
            self.get_optional(&format!("api/actors/{id}/"), &[]).await?;
        Ok(dto.map(|dto| dto.into_actor_detail(&self.media_base_url)))
    }

    async fn actor_movies(&self, id: i32) -> RemoteResult<Vec<Movie>> {
        let page: MoviesPage = self.get_json(&format!("api/actors/{id}/movies/"), &[]).await?;
        Ok(self.movies(page.results))
    }
}

/// Expands a relative media path against `media_base_url`. Blank paths are dropped.
fn full_url(path: Option<String>, media_base_url: &str) -> Option<String> {
    let path = path?;
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    if path.starts_with("http") {
        return Some(path.to_string());
    }

    let base = media_base_url.trim_end_matches('/');
    if path.starts_with('/') {
        Some(format!("{base}{path}"))
    } else {
        Some(format!("{base}/{path}"))
    }
}

#[derive(Debug, Deserialize)]
struct MoviesPage {
    results: Vec<MovieDto>,
}

#[derive(Debug, Deserialize)]
struct MovieDto {
    id: i32,
    title: String,
    #[serde(default)]
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    #[serde(default)]
    rating: f32,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    vote_count: i32,
    genre_ids: Option<Vec<i32>>,
    genres: Option<Vec<GenreDto>>,
}

impl MovieDto {
    fn into_movie(self, media_base_url: &str) -> Movie {
        let genre_ids = self
            .genre_ids
            .or_else(|| self.genres.map(|genres| genres.into_iter().map(|g| g.id).collect()))
            .unwrap_or_default();

        Movie {
            id: self.id,
            title: self.title,
            overview: self.overview.unwrap_or_default(),
            poster_url: full_url(self.poster_path, media_base_url),
            backdrop_url: full_url(self.backdrop_path, media_base_url),
            rating: self.rating,
            release_date: self.release_date.unwrap_or_default(),
            genre_ids,
            vote_count: self.vote_count,
            is_favorite: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CastDto {
    id: i32,
    name: String,
    character: Option<String>,
    profile_path: Option<String>,
}

impl CastDto {
    fn into_cast_member(self, media_base_url: &str) -> CastMember {
        CastMember {
            id: self.id,
            name: self.name,
            character: self.character.unwrap_or_default(),
            profile_url: full_url(self.profile_path, media_base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActorDetailDto {
    id: i32,
    name: String,
    profile_path: Option<String>,
    biography: Option<String>,
    birthday: Option<String>,
    place_of_birth: Option<String>,
}

impl ActorDetailDto {
    fn into_actor_detail(self, media_base_url: &str) -> ActorDetail {
        ActorDetail {
            id: self.id,
            name: self.name,
            biography: self.biography.unwrap_or_default(),
            birthday: self.birthday,
            place_of_birth: self.place_of_birth,
            profile_url: full_url(self.profile_path, media_base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenreDto {
    id: i32,
    name: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const MEDIA: &str = "https://media.example/";

    #[test]
    fn media_paths_are_made_absolute() {
        assert_eq!(
            full_url(Some("/posters/1.jpg".into()), MEDIA).as_deref(),
            Some("https://media.example/posters/1.jpg")
        );
        assert_eq!(
            full_url(Some("posters/1.jpg".into()), MEDIA).as_deref(),
            Some("https://media.example/posters/1.jpg")
        );
        assert_eq!(
            full_url(Some("https://cdn.example/p.jpg".into()), MEDIA).as_deref(),
            Some("https://cdn.example/p.jpg")
        );
        assert_eq!(full_url(Some("  ".into()), MEDIA), None);
        assert_eq!(full_url(None, MEDIA), None);
    }

    #[test]
    fn movie_page_decodes_and_never_sets_favorite() {
        let page: MoviesPage = serde_json::from_value(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{
                "id": 1,
                "title": "Inception",
                "overview": "A thief who steals corporate secrets.",
                "poster_path": "/media/posters/inception.jpg",
                "backdrop_path": null,
                "rating": 8.4,
                "release_date": "2010-07-16",
                "vote_count": 34521,
                "genre_ids": [28, 878, 53],
                "is_favorite": true
            }]
        }))
        .unwrap();

        let movie = page.results.into_iter().next().unwrap().into_movie(MEDIA);
        assert_eq!(movie.genre_ids, vec![28, 878, 53]);
        assert_eq!(
            movie.poster_url.as_deref(),
            Some("https://media.example/media/posters/inception.jpg")
        );
        assert_eq!(movie.backdrop_url, None);
        assert!(!movie.is_favorite);
    }

    #[test]
    fn detail_payload_falls_back_to_embedded_genres() {
        let dto: MovieDto = serde_json::from_value(json!({
            "id": 2,
            "title": "Interstellar",
            "overview": null,
            "poster_path": "",
            "backdrop_path": null,
            "rating": 8.7,
            "release_date": null,
            "genres": [{ "id": 12, "name": "Adventure" }, { "id": 18, "name": "Drama" }]
        }))
        .unwrap();

        let movie = dto.into_movie(MEDIA);
        assert_eq!(movie.genre_ids, vec![12, 18]);
        assert_eq!(movie.overview, "");
        assert_eq!(movie.release_date, "");
        assert_eq!(movie.poster_url, None);
        assert_eq!(movie.vote_count, 0);
    }

    #[test]
    fn cast_without_character_gets_empty_string() {
        let cast: Vec<CastDto> = serde_json::from_value(json!([
            { "id": 5, "name": "Zendaya", "profile_path": "/p/5.jpg" }
        ]))
        .unwrap();

        let member = cast.into_iter().next().unwrap().into_cast_member(MEDIA);
        assert_eq!(member.character, "");
        assert_eq!(member.profile_url.as_deref(), Some("https://media.example/p/5.jpg"));
    }
}
