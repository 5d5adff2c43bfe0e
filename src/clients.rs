pub(crate) mod moltbook;

pub(crate) use moltbook::MoltbookClient;
