// Task channels
pub const ITEM_DEFAULT_CHANNEL_SIZE: usize = 50;
pub const ERROR_CHANNEL_SIZE: usize = 10;
pub const SIGNAL_CHANNEL_SIZE: usize = 1;

// System variables
pub const MAX_ALLOWED_PACKET: i64 = 1024 * 1024;
pub const CURRENT_USER: &str = "user";
pub const CONNECTION_ID: i64 = 1;
pub const UTC_TIMEDIFF: &str = "00:00:00.000000";

// Join keys
pub const JOIN_KEY_SEPARATOR: char = '\0';

// TaskBase
pub const NO_HANDLER_MSG: &str = "Must have a handler to run a base task runner.";
pub const NOT_A_LIST_TASK_MSG: &str = "This is not a list-type task";

// JobBuilder
pub const MUST_IMPLEMENT_SCANNER_MSG: &str = "Must implement Scanner";
pub const MUST_IMPLEMENT_COLUMNS_MSG: &str = "Must implement ColumnLister to build a column index";
pub const UNSUPPORTED_WHERE_MSG: &str = "Unsupported Where Type";
