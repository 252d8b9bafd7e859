use common::AttributeDocument;

/// Copy every series attribute the instance lacks into the instance
///
/// Instance attributes always win. `series` is only read, so sibling
/// instances of the same series never observe each other's changes.
pub fn merge_series_into_instance(
    series: &AttributeDocument,
    mut instance: AttributeDocument,
) -> AttributeDocument {
    let target = instance.as_map_mut();
    for (key, node) in series.iter() {
        if !target.contains_key(key) {
            target.insert(key.clone(), node.clone());
        }
    }
    instance
}
