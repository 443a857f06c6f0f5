//! Preset catalog
//!
//! Presets are the high-level channel recipes users pick from. Static
//! presets carry a fixed filter; dynamic presets enumerate entities out of
//! the library (genres, decades, people, ...) and spawn one channel per
//! qualifying entity.

use crate::models::ChannelFilter;

/// Entity family a dynamic preset enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicSource {
    Genres,
    Eras,
    Directors,
    Actors,
    Composers,
    Studios,
    Collections,
    Playlists,
}

#[derive(Debug, Clone)]
pub enum PresetKind {
    Static(ChannelFilter),
    Dynamic(DynamicSource),
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: PresetKind,
}

/// Curated director names emitted first, in this order, when present in the
/// library. Matching is case-insensitive.
pub const PRIORITY_DIRECTORS: &[&str] = &[
    "Steven Spielberg",
    "Martin Scorsese",
    "Alfred Hitchcock",
    "Stanley Kubrick",
    "Quentin Tarantino",
    "Christopher Nolan",
    "Ridley Scott",
    "Francis Ford Coppola",
    "David Fincher",
    "James Cameron",
];

pub const PRIORITY_ACTORS: &[&str] = &[
    "Tom Hanks",
    "Denzel Washington",
    "Meryl Streep",
    "Harrison Ford",
    "Tom Cruise",
    "Sigourney Weaver",
    "Samuel L. Jackson",
    "Cate Blanchett",
    "Robert De Niro",
    "Frances McDormand",
];

pub const PRIORITY_COMPOSERS: &[&str] = &[
    "John Williams",
    "Hans Zimmer",
    "Ennio Morricone",
    "Jerry Goldsmith",
    "Howard Shore",
    "Danny Elfman",
    "James Horner",
    "Alexandre Desplat",
];

/// Look up a preset by id.
#[must_use]
pub fn find(id: &str) -> Option<Preset> {
    catalog().into_iter().find(|p| p.id == id)
}

/// The full preset catalog.
#[must_use]
pub fn catalog() -> Vec<Preset> {
    let stat = |id, name, filter| Preset { id, name, kind: PresetKind::Static(filter) };
    let dynamic = |id, name, source| Preset { id, name, kind: PresetKind::Dynamic(source) };

    let genre = |id, name, genres: &[&str]| {
        stat(
            id,
            name,
            ChannelFilter {
                genres: genres.iter().map(ToString::to_string).collect(),
                ..Default::default()
            },
        )
    };

    vec![
        // Dynamic families
        dynamic("auto-genres", "Genres", DynamicSource::Genres),
        dynamic("auto-eras", "Eras", DynamicSource::Eras),
        dynamic("auto-directors", "Directors", DynamicSource::Directors),
        dynamic("auto-actors", "Actors", DynamicSource::Actors),
        dynamic("auto-composers", "Composers", DynamicSource::Composers),
        dynamic("auto-studios", "Studios", DynamicSource::Studios),
        dynamic("auto-collections", "Collections", DynamicSource::Collections),
        dynamic("auto-playlists", "Playlists", DynamicSource::Playlists),
        // Static recipes
        stat(
            "movies",
            "Movies",
            ChannelFilter { include_episodes: false, ..Default::default() },
        ),
        stat(
            "tv",
            "TV",
            ChannelFilter { include_movies: false, ..Default::default() },
        ),
        genre("action", "Action & Adventure", &["action", "adventure"]),
        genre("comedy", "Comedy", &["comedy"]),
        genre("drama", "Drama", &["drama"]),
        genre("sci-fi", "Sci-Fi & Fantasy", &["science fiction", "sci-fi", "fantasy"]),
        genre("horror", "Late Night Horror", &["horror", "thriller"]),
        stat(
            "kids",
            "Kids",
            ChannelFilter {
                ratings: ["G", "PG", "TV-Y", "TV-Y7", "TV-G", "TV-PG"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                ..Default::default()
            },
        ),
        stat(
            "classics",
            "Classics",
            ChannelFilter { year_max: Some(1979), ..Default::default() },
        ),
        stat(
            "nineties",
            "Totally 90s",
            ChannelFilter { year_min: Some(1990), year_max: Some(1999), ..Default::default() },
        ),
    ]
}
