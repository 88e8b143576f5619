//! Screens the operator moves between

use std::time::Duration;

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    DeviceList,
    RpcConsole,
}

impl Screen {
    /// Where to start: the device list when a token is stored, else login
    pub fn initial(session: &Session) -> Self {
        if session.is_logged_in() {
            Screen::DeviceList
        } else {
            Screen::Login
        }
    }
}

pub trait Navigator {
    fn go_to(&mut self, screen: Screen);
}

/// Leave the expired-session message up for `delay`, then show login
pub async fn redirect_to_login<N: Navigator + ?Sized>(nav: &mut N, delay: Duration) {
    tokio::time::sleep(delay).await;
    nav.go_to(Screen::Login);
}
