use serde::de::DeserializeOwned;
use serde::Serialize;

/// A batch operation over `total()` indexed steps that can be checkpointed
/// and resumed part way through.
///
/// `process` folds step `index` into the aggregate. The aggregate is what
/// gets persisted at each checkpoint, so everything a resumed run needs must
/// live there rather than in `self`.
pub trait ResumableOperation {
    type Aggregate: Serialize + DeserializeOwned + Default;

    fn operation(&self) -> &str;

    fn total(&self) -> usize;

    fn process(&mut self, index: usize, aggregate: &mut Self::Aggregate) -> Result<(), String>;

    /// Called once after the last step; the returned value becomes the
    /// task's result.
    fn finish(&mut self, aggregate: Self::Aggregate) -> Result<serde_json::Value, String>;
}
