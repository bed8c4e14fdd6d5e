mod listener;
mod stream;

pub use self::{
    listener::{bind, ConnectedEvent, ListenerAction, ListenerEvent, ListenerInfo},
    stream::{connect, RecvEvent, SendAction, StreamAction, StreamEvent},
};
