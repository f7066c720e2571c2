use std::cmp::Ordering;

use crate::models::{FilterState, Movie, SortBy};

/// Narrows `movies` by genre, year and minimum rating, then sorts.
///
/// Each constraint is skipped when empty/absent; together they are ANDed.
/// The sort is stable.
pub fn filter_and_sort(movies: Vec<Movie>, filter: &FilterState) -> Vec<Movie> {
    let mut movies: Vec<Movie> = movies
        .into_iter()
        .filter(|m| {
            filter.genre_ids.is_empty() || m.genre_ids.iter().any(|g| filter.genre_ids.contains(g))
        })
        .filter(|m| {
            filter.years.is_empty() || m.release_year().is_some_and(|y| filter.years.contains(&y))
        })
        .filter(|m| filter.min_rating.is_none_or(|min| m.rating >= min))
        .collect();

    sort_movies(&mut movies, filter.sort_by);
    movies
}

pub fn sort_movies(movies: &mut [Movie], sort_by: SortBy) {
    match sort_by {
        SortBy::RatingDesc => movies.sort_by(|a, b| b.rating.total_cmp(&a.rating)),
        SortBy::RatingAsc => movies.sort_by(|a, b| a.rating.total_cmp(&b.rating)),
        SortBy::YearDesc => movies.sort_by(|a, b| by_year(a, b, true)),
        SortBy::YearAsc => movies.sort_by(|a, b| by_year(a, b, false)),
        SortBy::TitleAsc => movies.sort_by(|a, b| by_title(a, b)),
        SortBy::TitleDesc => movies.sort_by(|a, b| by_title(b, a)),
    }
}

// Movies without a parsable year go last in both directions.
fn by_year(a: &Movie, b: &Movie, descending: bool) -> Ordering {
    match (a.release_year(), b.release_year()) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_title(a: &Movie, b: &Movie) -> Ordering {
    a.title.to_lowercase().cmp(&b.title.to_lowercase())
}
