use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::RemoteSource;
use crate::{
    error::{RemoteError, RemoteResult},
    filter::filter_and_sort,
    models::{ActorDetail, CastMember, Genre, Movie, RemoteFilter},
};

/// Fixed in-process catalog used when no catalog URL is configured.
pub struct DemoCatalog {
    movies: Vec<Movie>,
    genres: Vec<Genre>,
}

impl DemoCatalog {
    pub fn new() -> Self {
        tracing::warn!("Using demo catalog data - no CATALOG_BASE_URL provided");

        let genres = [
            (28, "Action"),
            (12, "Adventure"),
            (35, "Comedy"),
            (80, "Crime"),
            (18, "Drama"),
            (14, "Fantasy"),
            (36, "History"),
            (10749, "Romance"),
            (878, "Science Fiction"),
            (53, "Thriller"),
            (10752, "War"),
        ]
        .into_iter()
        .map(|(id, name)| Genre { id, name: name.to_string() })
        .collect();

        let movies = vec![
            demo_movie(1, "Inception", 8.4, "2010-07-16", &[28, 878, 53], 34521),
            demo_movie(2, "Interstellar", 8.7, "2014-11-07", &[12, 18, 878], 32145),
            demo_movie(3, "The Dark Knight", 9.0, "2008-07-18", &[28, 80, 18], 31002),
            demo_movie(4, "The Matrix", 8.7, "1999-03-31", &[28, 878], 24876),
            demo_movie(5, "Fight Club", 8.8, "1999-10-15", &[18, 53], 28419),
            demo_movie(6, "Forrest Gump", 8.8, "1994-07-06", &[35, 18, 10749], 26603),
            demo_movie(7, "The Return of the King", 8.9, "2003-12-17", &[12, 14, 28], 23110),
            demo_movie(8, "Gladiator", 8.5, "2000-05-05", &[28, 18, 36], 19277),
            demo_movie(9, "Schindler's List", 9.0, "1993-12-15", &[18, 36, 10752], 15702),
            demo_movie(10, "The Shawshank Redemption", 9.3, "1994-09-23", &[18, 80], 26811),
            demo_movie(11, "Avatar", 7.6, "2009-12-18", &[28, 12, 14, 878], 30514),
            demo_movie(12, "Titanic", 7.9, "1997-12-19", &[18, 10749], 24432),
        ];

        Self { movies, genres }
    }
}

impl Default for DemoCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSource for DemoCatalog {
    async fn popular_movies(&self) -> RemoteResult<Vec<Movie>> {
        Ok(self.movies.clone())
    }

    async fn movie_details(&self, id: i32) -> RemoteResult<Option<Movie>> {
        Ok(self.movies.iter().find(|m| m.id == id).cloned())
    }

    async fn movie_cast(&self, _id: i32) -> RemoteResult<Vec<CastMember>> {
        Ok(Vec::new())
    }

    async fn search_movies(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> RemoteResult<Vec<Movie>> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let needle = text.to_lowercase();
        Ok(self.movies.iter().filter(|m| m.matches_text(&needle)).cloned().collect())
    }

    async fn genres(&self) -> RemoteResult<Vec<Genre>> {
        Ok(self.genres.clone())
    }

    async fn movies_filtered(&self, filter: &RemoteFilter) -> RemoteResult<Vec<Movie>> {
        let needle = filter.text.as_deref().unwrap_or_default().to_lowercase();
        let movies = self.movies.iter().filter(|m| m.matches_text(&needle)).cloned().collect();
        Ok(filter_and_sort(movies, &filter.to_filter_state()))
    }

    async fn actor_details(&self, _id: i32) -> RemoteResult<Option<ActorDetail>> {
        Ok(None)
    }

    async fn actor_movies(&self, _id: i32) -> RemoteResult<Vec<Movie>> {
        Ok(Vec::new())
    }
}

fn demo_movie(
    id: i32,
    title: &str,
    rating: f32,
    release_date: &str,
    genre_ids: &[i32],
    vote_count: i32,
) -> Movie {
    Movie {
        id,
        title: title.to_string(),
        overview: String::new(),
        poster_url: None,
        backdrop_url: None,
        rating,
        release_date: release_date.to_string(),
        genre_ids: genre_ids.to_vec(),
        vote_count,
        is_favorite: false,
    }
}
