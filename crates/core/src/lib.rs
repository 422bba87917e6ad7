pub mod correction {
    pub mod correction_engine;
}

pub mod detection {
    pub mod domain {
        pub mod person_detector;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod box_filter;
    pub mod frame_outcome;
    pub mod ingest_config;
    pub mod ingest_task;
    pub mod ingest_video_use_case;
    pub mod pipeline_logger;
}

pub mod promotion {
    pub mod promote_session_use_case;
}

pub mod session {
    pub mod domain {
        pub mod image_uri;
        pub mod path_component;
        pub mod person_map;
        pub mod session_error;
        pub mod store_layout;
    }
    pub mod infrastructure {
        pub mod fs_session_store;
        pub mod session_locks;
    }
}

pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod crop_writer;
        pub mod video_reader;
    }
    pub mod infrastructure {
        pub mod ffmpeg_reader;
        pub mod jpeg_crop_writer;
    }
}
