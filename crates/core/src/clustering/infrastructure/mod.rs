pub mod dbscan;
pub mod json_embedding_store;
pub mod jsonl_checkpoint;
mod math;
pub mod mean_distance_oracle;
pub mod vote_oracle;
