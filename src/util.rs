pub(crate) mod retry;
pub(crate) mod text;
pub(crate) mod time;
