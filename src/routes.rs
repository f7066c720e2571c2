use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{FilterState, Genre, Movie, RemoteFilter},
    session::{ActorState, DetailState, MoviesState, SearchState},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/movies", get(movies))
        .route("/movies/refresh", post(refresh))
        .route("/movies/filter", post(apply_filters).delete(clear_filters))
        .route("/movies/{id}", get(movie_details))
        .route("/movies/{id}/favorite", post(toggle_favorite))
        .route("/favorites", get(favorites))
        .route("/favorites/events", get(favorite_events))
        .route("/genres", get(genres))
        .route("/genres/{id}/movies", get(genre_movies))
        .route("/search", get(search))
        .route("/discover", get(discover))
        .route("/actors/{id}", get(actor))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

pub async fn movies(State(state): State<Arc<AppState>>) -> Json<MoviesState> {
    Json(state.session.load_movies().await)
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<MoviesState> {
    Json(state.session.refresh_movies().await)
}

pub async fn apply_filters(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<FilterState>,
) -> Json<MoviesState> {
    Json(state.session.apply_filters(filter).await)
}

pub async fn clear_filters(State(state): State<Arc<AppState>>) -> Json<MoviesState> {
    Json(state.session.clear_filters().await)
}

pub async fn movie_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<DetailState>> {
    let detail = state.session.load_movie_details(id).await;
    if detail.movie_details.is_none() {
        return Err(AppError::not_found(format!("movie {id}")));
    }
    Ok(Json(detail))
}

pub async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Movie>> {
    Ok(Json(state.session.toggle_favorite_by_id(id).await?))
}

pub async fn favorites(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Movie>>> {
    Ok(Json(state.session.sync().store().favorite_movies().await?))
}

/// Current favorites on connect, then the full list again after every change.
pub async fn favorite_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.session.subscribe_favorites();

    let stream = async_stream::stream! {
        loop {
            let favorites = rx.borrow_and_update().clone();
            match Event::default().event("favorites").json_data(&favorites) {
                Ok(event) => yield Ok(event),
                Err(err) => warn!(error = %err, "failed to encode favorites event"),
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn genres(State(state): State<Arc<AppState>>) -> Json<Vec<Genre>> {
    Json(state.session.load_genres().await)
}

pub async fn genre_movies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = state.session.sync().movies_by_genre(id).next().await.transpose()?;
    Ok(Json(movies.unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SearchState>> {
    Ok(Json(state.session.search(&query.q).await?))
}

pub async fn discover(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RemoteFilter>,
) -> AppResult<Json<Vec<Movie>>> {
    Ok(Json(state.session.sync().discover_movies(&filter).await?))
}

pub async fn actor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<ActorState>> {
    let actor = state.session.load_actor(id).await;
    if actor.actor.is_none() {
        return Err(AppError::not_found(format!("actor {id}")));
    }
    Ok(Json(actor))
}
