/// Private interfaces for the amprpc session
///
/// Adapters should not use this module.
/// Backward-incompatible changes can be made without major version bump.
use amprpc_core::ChannelId;

pub trait DynamicCallbacks {
    fn on_created(&self, channel: ChannelId);
    fn on_deleted(&self, channel: ChannelId);
    fn on_received(&self, channel: ChannelId, payload: &[u8]);
}
