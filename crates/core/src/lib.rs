pub mod clustering {
    pub mod domain {
        pub mod checkpoint;
        pub mod embedding_store;
        pub mod observation;
        pub mod similarity_oracle;
    }
    pub mod cluster_engine;
    pub mod infrastructure;
}

pub mod config;

pub mod detection {
    pub mod domain {
        pub mod face_model;
    }
    pub mod infrastructure;
}

pub mod imaging {
    pub mod domain {
        pub mod image_reader;
        pub mod image_writer;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod batch_cluster_use_case;
    pub mod image_scanner;
    pub mod infrastructure;
    pub mod locate_face_use_case;
    pub mod sort_photos_use_case;
    pub mod status_use_case;
}

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod durable_file;
    pub mod embedding;
    pub mod frame;
}

pub mod storage {
    pub mod domain {
        pub mod audit_log;
        pub mod file_store;
    }
    pub mod infrastructure;
}
