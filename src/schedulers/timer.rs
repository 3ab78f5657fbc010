use std::fmt::Debug;

#[cfg(test)]
use std::net::SocketAddr;

pub(crate) trait TTimer: Debug + Send + Sync + 'static {
    type Callback: Default + Send;

    fn tick(&mut self) -> u32;
    fn to_timeout_callback(self, id: u32) -> Self::Callback;

    #[cfg(test)]
    fn target(&self) -> Option<SocketAddr>;
}
