use crate::db::*;
use crate::types::TaskState;


/// A minimal active task for store tests
fn new_task(name: &str) -> NewTask {
    NewTask {
        tag: None,
        source_uri: format!("https://example.com/{name}"),
        title: name.to_string(),
        description: None,
        dest_uri: format!("/downloads/{name}"),
        temp_uri: format!("/temp/{name}.part"),
        max_retry: 5,
        state: TaskState::Active.to_i32(),
    }
}

fn tagged_task(name: &str, tag: &str) -> NewTask {
    NewTask {
        tag: Some(tag.to_string()),
        ..new_task(name)
    }
}
