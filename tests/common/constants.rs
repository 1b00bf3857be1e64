//! Shared constants for test fixtures and clients.

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// HS256 secret shared between the test server's verifier and the clients
/// that mint tokens.
pub const TEST_AUTH_SECRET: &str = "e2e-shared-test-secret";
pub const TEST_SIGNING_SECRET: &str = "e2e-url-signing-secret";

pub const TEST_SUBJECT: &str = "idp|user-regular";
pub const TEST_EMAIL: &str = "ada@example.org";
pub const TEST_NAME: &str = "Ada Quill";
pub const PREMIUM_SUBJECT: &str = "idp|user-premium";
pub const PREMIUM_EMAIL: &str = "marcus@example.org";

pub const SPEAKER_FREE_ID: &str = "spk-free";
pub const SPEAKER_FREE_NAME: &str = "Ada Quill";
pub const SPEAKER_PREMIUM_ID: &str = "spk-premium";
pub const SPEAKER_PREMIUM_NAME: &str = "Marcus Webb";

pub const COLLECTION_RIVERS_ID: &str = "col-rivers";
pub const COLLECTION_PREMIUM_ID: &str = "col-premium";

pub const LECTURE_HEADWATERS_ID: &str = "lec-headwaters";
pub const LECTURE_DELTAS_ID: &str = "lec-deltas";
pub const LECTURE_PREMIUM_ID: &str = "lec-premium";

pub const CATEGORY_HISTORY_SLUG: &str = "history";
pub const CATEGORY_ANCIENT_SLUG: &str = "ancient-history";
pub const CATEGORY_SCIENCE_SLUG: &str = "science";

/// Size of the main test audio file.
pub const TEST_AUDIO_SIZE_BYTES: usize = 8192;
/// Stream chunk ceiling configured on the test server. Deliberately smaller
/// than the audio file so clamping is observable.
pub const TEST_MAX_STREAM_CHUNK: u64 = 1024;
