use crate::MockCoordinationStore;
use crate::NodeStat;
use crate::StoreError;

/// Mock store whose reservation creates succeed with the given realized
/// paths, in order.
pub(crate) fn mock_store_creating(paths: Vec<&'static str>) -> MockCoordinationStore {
    let mut store = MockCoordinationStore::new();
    let mut paths = paths.into_iter();
    store
        .expect_create_node()
        .returning(move |prefix, _, _, _| match paths.next() {
            Some(path) => Ok(path.to_string()),
            None => Err(StoreError::NodeExists(prefix.to_string())),
        });
    store
}

pub(crate) fn stat_with_children(num_children: i32) -> NodeStat {
    NodeStat {
        num_children,
        ..Default::default()
    }
}
