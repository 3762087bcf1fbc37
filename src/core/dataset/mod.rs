mod label;
mod repository;
mod split;

pub use label::{parse_label_file, save_label_file, YoloDetection};
pub use repository::{is_image, DatasetRepository, DatasetSource, LayoutStrategy, SplitMap, IMAGE_EXTENSIONS};
pub use split::DatasetSplit;
