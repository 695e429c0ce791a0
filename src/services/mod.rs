pub(crate) mod answer_journal;
pub(crate) mod availability;
pub(crate) mod classifier;
pub(crate) mod scoring;
pub(crate) mod sessions;
