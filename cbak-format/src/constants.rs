//! Field names, array grammar tokens and defaults for cbak backup files

/// Array-open token written when a backup is opened.
pub const ARRAY_OPEN: &[u8] = b"[\n";

/// Separator written between two records.
pub const RECORD_SEPARATOR: &[u8] = b",\n";

/// Array-close token written when a backup is closed.
pub const ARRAY_CLOSE: &[u8] = b"]\n";

/// Default backup file name.
pub const DEFAULT_BACKUP_FILE_NAME: &str = "contacts.json";

/// Default pretty-print indentation width (spaces).
pub const DEFAULT_INDENT: usize = 3;

/// Default number of bytes consumed between two byte-progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL_BYTES: u64 = 100;

/// Record identifier (non-authoritative label on import).
pub const ID: &str = "id";
/// Record name.
pub const NAME: &str = "name";
/// Custom ring tone URI.
pub const CUSTOM_RING_TONE: &str = "custom_ring_tone";
/// Display name.
pub const DISPLAY_NAME: &str = "display_name";
/// Last time contacted (epoch millis).
pub const LAST_TIME_CONTACTED: &str = "last_time_contacted";
/// Free-form notes.
pub const NOTES: &str = "notes";
/// Phonetic name.
pub const PHONETIC_NAME: &str = "phonetic_name";
/// Send calls straight to voicemail.
pub const SEND_TO_VOICEMAIL: &str = "send_to_voicemail";
/// Starred flag.
pub const STARRED: &str = "starred";
/// Number of times contacted.
pub const TIMES_CONTACTED: &str = "times_contacted";
/// Contact methods sub-collection.
pub const CONTACT_METHODS: &str = "contact_methods";
/// Phone numbers sub-collection.
pub const PHONE_NUMBERS: &str = "phone_numbers";
/// Organizations sub-collection.
pub const ORGANIZATIONS: &str = "organizations";
/// Photos sub-collection.
pub const PHOTOS: &str = "photos";

/// Child column: primary entry flag.
pub const IS_PRIMARY: &str = "is_primary";
/// Child column: user-visible label.
pub const LABEL: &str = "label";
/// Child column: entry type.
pub const TYPE: &str = "type";
/// Contact method column: auxiliary data.
pub const AUX_DATA: &str = "aux_data";
/// Contact method column: payload (address, handle, ...).
pub const DATA: &str = "data";
/// Contact method column: kind of method.
pub const KIND: &str = "kind";
/// Phone column: the number as entered.
pub const NUMBER: &str = "number";
/// Phone column: normalized lookup key.
pub const NUMBER_KEY: &str = "number_key";
/// Organization column: job title.
pub const TITLE: &str = "title";
/// Organization column: company name.
pub const COMPANY: &str = "company";
