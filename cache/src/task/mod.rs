pub(crate) mod notifier;
pub(crate) mod refresh;
