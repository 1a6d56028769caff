pub mod actor;
pub mod cache_entry;
pub mod film;
pub mod film_actor;
pub mod film_genre;
pub mod film_stats;
pub mod genre;
pub mod review;
pub mod user;
