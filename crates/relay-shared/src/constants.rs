/// Application name
pub const APP_NAME: &str = "Relay";

/// Length of a user id in characters
pub const USER_ID_LEN: usize = 8;

/// Characters a user id is drawn from (ids are stored upper-cased)
pub const USER_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of trailing id characters used for generated fallback names
pub const FALLBACK_NAME_SUFFIX_LEN: usize = 4;

/// Hard cap on id-prefix search results (contact entry assist, not a directory)
pub const MAX_SEARCH_RESULTS: usize = 5;

/// Default capacity of the in-process change feed
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// How many times the resolver re-queries after losing a creation race
pub const RESOLVE_MAX_ATTEMPTS: usize = 3;
