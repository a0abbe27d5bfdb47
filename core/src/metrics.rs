use prometheus_client::registry::Registry;

/// Carve out a namespaced sub-registry so each component registers its
/// counters/gauges under its own prefix without components needing to share
/// a `&mut Registry` simultaneously.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("gateway")
}
