use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    /// 0 to 10.
    pub rating: f32,
    pub release_date: String,
    pub genre_ids: Vec<i32>,
    pub vote_count: i32,
    /// Local-only flag; the remote catalog never supplies it.
    #[serde(default)]
    pub is_favorite: bool,
}

impl Movie {
    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Year taken from the first four characters of `release_date`.
    pub fn release_year(&self) -> Option<i32> {
        parse_year(&self.release_date)
    }

    pub fn has_genre(&self, genre_id: i32) -> bool {
        self.genre_ids.contains(&genre_id)
    }

    /// Case-insensitive substring match on title or overview.
    /// `needle` must already be lowercased.
    pub fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.overview.to_lowercase().contains(needle)
    }
}

pub fn parse_year(release_date: &str) -> Option<i32> {
    let prefix = release_date.get(..4)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub id: i32,
    pub name: String,
    pub character: String,
    pub profile_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorDetail {
    pub id: i32,
    pub name: String,
    pub biography: String,
    pub birthday: Option<String>,
    pub place_of_birth: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovieDetails {
    pub movie: Movie,
    pub cast: Vec<CastMember>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    RatingDesc,
    RatingAsc,
    YearDesc,
    YearAsc,
    TitleAsc,
    TitleDesc,
}

impl SortBy {
    /// Value of the catalog API `ordering` query parameter.
    pub fn as_ordering(self) -> &'static str {
        match self {
            SortBy::RatingDesc => "-rating",
            SortBy::RatingAsc => "rating",
            SortBy::YearDesc => "-release_date",
            SortBy::YearAsc => "release_date",
            SortBy::TitleAsc => "title",
            SortBy::TitleDesc => "-title",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub genre_ids: BTreeSet<i32>,
    pub years: BTreeSet<i32>,
    pub min_rating: Option<f32>,
    pub sort_by: SortBy,
}

impl FilterState {
    pub fn has_active_filters(&self) -> bool {
        !self.genre_ids.is_empty() || !self.years.is_empty() || self.min_rating.is_some()
    }
}

/// Single-valued filter understood by the remote catalog.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteFilter {
    pub genre_id: Option<i32>,
    pub actor_id: Option<i32>,
    pub year: Option<i32>,
    pub min_rating: Option<f32>,
    pub text: Option<String>,
    pub ordering: SortBy,
}

impl RemoteFilter {
    /// Closest local equivalent; `actor_id` and `text` have no counterpart here.
    pub fn to_filter_state(&self) -> FilterState {
        FilterState {
            genre_ids: self.genre_id.into_iter().collect(),
            years: self.year.into_iter().collect(),
            min_rating: self.min_rating,
            sort_by: self.ordering,
        }
    }
}
