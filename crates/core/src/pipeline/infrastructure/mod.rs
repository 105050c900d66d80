pub mod observation_cache;
pub mod threaded_image_scanner;
