pub mod csv_audit_log;
pub mod local_file_store;
pub mod run_lock;
pub mod source_walker;
