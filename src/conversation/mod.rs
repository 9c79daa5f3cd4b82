pub mod adapter;
pub mod projection;
pub mod view_model;

pub use adapter::{
    guess_content_type, ChannelState, ConversationAdapter, ConversationEvent, EventSender,
    Subscription,
};
pub use projection::{MessageProjection, Reconciled};
pub use view_model::ChatViewModel;
