pub(crate) mod edition;
pub(crate) mod jsonl;
pub(crate) mod target_triple;
