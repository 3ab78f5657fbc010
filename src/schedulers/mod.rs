pub(crate) mod actor;
pub(crate) mod ticker;
pub(crate) mod ticker_message;
pub(crate) mod timer;
