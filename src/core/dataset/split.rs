const TRAIN_ALIASES: [&str; 3] = ["train", "training", "trn"];
const VAL_ALIASES: [&str; 6] = ["val", "valid", "validation", "eval", "evaluation", "dev"];
const TEST_ALIASES: [&str; 3] = ["test", "testing", "tst"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetSplit {
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    pub fn as_str(&self) -> &str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }

    /// Map a free-form split folder name onto train/val/test.
    ///
    /// Matching is case-insensitive and also accepts names that start with a
    /// known alias (`train2017`, `validation_set`). Unknown names fall back
    /// to `Train`.
    pub fn normalize(name: &str) -> DatasetSplit {
        let lower = name.trim().to_lowercase();
        let matches = |aliases: &[&str]| aliases.iter().any(|a| lower.starts_with(a));

        if matches(&TRAIN_ALIASES) {
            DatasetSplit::Train
        } else if matches(&VAL_ALIASES) {
            DatasetSplit::Val
        } else if matches(&TEST_ALIASES) {
            DatasetSplit::Test
        } else {
            DatasetSplit::Train
        }
    }
}

impl std::fmt::Display for DatasetSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
