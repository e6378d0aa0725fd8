pub(crate) mod account;
pub(crate) mod extract;
pub(crate) mod files;
