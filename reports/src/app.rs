use hayloft_auth::{AnisetteClient, DeviceIdentity};
use hayloft_common::state::AuthState;
use std::{ops::Deref, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub struct AppInner {
    pub cancel: CancellationToken,
    pub auth: AuthState,
    pub anisette: AnisetteClient,
    pub device: DeviceIdentity,
    pub http: reqwest::Client,
}

#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl Deref for App {
    type Target = AppInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl App {
    pub fn new(cancel: CancellationToken, auth: AuthState, anisette: AnisetteClient) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("http client construction");
        Self {
            inner: Arc::new(AppInner {
                cancel,
                auth,
                anisette,
                // One identity per process, shared by every forwarded fetch.
                device: DeviceIdentity::generate(),
                http,
            }),
        }
    }
}
