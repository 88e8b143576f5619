//! Application state and command handlers

use anyhow::{Context, bail};
use tbrpc_core::{
    ApiClient, AuthClient, Config, DeviceDirectory, DirectoryError, FileStore, JsonlLog,
    Navigator, RpcInvoker, RpcRequest, Screen, Session, SessionSink, SessionStore,
    client::base_url,
    directory::{filter_devices, find_device},
    nav::redirect_to_login,
    templates::{self, RpcTemplate},
};
use tracing::{info, warn};

use crate::ui;

/// Prints which command leads to the requested screen
pub struct HintNavigator;

impl Navigator for HintNavigator {
    fn go_to(&mut self, screen: Screen) {
        let hint = match screen {
            Screen::Login => "Run `tbrpc login` to sign in.",
            Screen::DeviceList => "Run `tbrpc devices` and `tbrpc select <device>`.",
            Screen::RpcConsole => "Run `tbrpc invoke <method> --params '<json>'`.",
        };
        eprintln!("{}", hint);
    }
}

/// Main application struct
pub struct App {
    /// Configuration
    pub config: Config,

    /// Persisted session, device and favorites
    pub store: SessionStore<FileStore>,

    /// Operator session, loaded at startup
    pub session: Session,

    auth: AuthClient,
    directory: DeviceDirectory,
    invoker: RpcInvoker,
    history: JsonlLog,
    nav: HintNavigator,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let state_path = config.state_path()?;
        let store = SessionStore::new(
            FileStore::open(&state_path)
                .with_context(|| format!("opening {}", state_path.display()))?,
        );
        let session = store.load_session();

        let api = ApiClient::new(config.client.request_timeout());
        let auth = AuthClient::new(api.clone());
        let directory =
            DeviceDirectory::new(api.clone(), auth.clone()).with_page_size(config.client.page_size);
        let invoker = RpcInvoker::new(api, auth.clone());
        let history = JsonlLog::new(config.log_path()?);

        Ok(Self {
            config,
            store,
            session,
            auth,
            directory,
            invoker,
            history,
            nav: HintNavigator,
        })
    }

    /// Bail out with a hint unless a token is stored
    fn require_login(&mut self) -> anyhow::Result<()> {
        if Screen::initial(&self.session) == Screen::Login {
            self.nav.go_to(Screen::Login);
            bail!("not logged in");
        }
        Ok(())
    }

    /// Show the expiry, wait, then send the operator back to login
    async fn expire_session(&mut self, err: DirectoryError) -> anyhow::Error {
        eprintln!("{}", err);
        redirect_to_login(&mut self.nav, self.config.client.redirect_delay()).await;
        anyhow::Error::new(err)
    }

    pub async fn login(
        &mut self,
        server: Option<String>,
        username: Option<String>,
        password: Option<String>,
        remember_me: bool,
    ) -> anyhow::Result<()> {
        let server = server
            .or_else(|| Some(self.session.server_url.clone()).filter(|s| !s.is_empty()))
            .or_else(|| self.config.client.default_server_url.clone())
            .unwrap_or_default();
        let username = username
            .or_else(|| Some(self.session.username.clone()).filter(|u| !u.is_empty()))
            .unwrap_or_default();

        let Some(password) = password else {
            if self.session.is_account(&server, &username)
                && self.session.refresh_token().is_some()
            {
                println!("Logging in automatically...");
                match self.auth.resume(&mut self.session, &mut self.store).await {
                    Ok(()) => {
                        println!("Logged in as {}", self.session.display_label());
                        self.nav.go_to(Screen::DeviceList);
                        return Ok(());
                    }
                    Err(e) => warn!("Automatic login failed: {}", e),
                }
            }
            bail!("password is required (use --password or TBRPC_PASSWORD)");
        };

        let tokens = self.auth.login(&server, &username, &password).await?;

        let mut session = Session::new(&base_url(&server), &username);
        session.remember_me = remember_me;
        session.apply_login(tokens);
        self.store.save_session(&session)?;
        self.session = session;

        println!("Logged in as {}", self.session.display_label());
        self.nav.go_to(Screen::DeviceList);
        Ok(())
    }

    pub fn logout(&mut self) -> anyhow::Result<()> {
        // Keep server and username so the next login can prefill them
        self.session.clear_tokens();
        self.store.save_session(&self.session)?;
        self.store.clear_device_session()?;
        info!("Logged out {}", self.session.username);
        println!("Logged out");
        Ok(())
    }

    pub fn status(&mut self) {
        if !self.session.is_logged_in() {
            println!("Not logged in");
            self.nav.go_to(Screen::Login);
            return;
        }

        println!("{}", self.session.display_label());
        match self.store.load_device_session() {
            Some(device) => println!("Device: {} ({})", device.device_name, device.device_id),
            None => {
                println!("No device selected");
                self.nav.go_to(Screen::DeviceList);
            }
        }
    }

    pub async fn devices(&mut self, search: Option<&str>) -> anyhow::Result<()> {
        self.require_login()?;

        let devices = match self
            .directory
            .list_devices(&mut self.session, &mut self.store)
            .await
        {
            Ok(devices) => devices,
            Err(e @ DirectoryError::SessionExpired(_)) => return Err(self.expire_session(e).await),
            Err(e) => return Err(e.into()),
        };

        let shown = filter_devices(&devices, search.unwrap_or_default());
        let favorites = self.store.load_favorites();
        let (favs, rest) = favorites.partition(shown);

        print!("{}", ui::device_list(&favs, &rest));
        Ok(())
    }

    pub fn toggle_favorite(&mut self, device_id: &str) -> anyhow::Result<()> {
        let mut favorites = self.store.load_favorites();
        let now = favorites.toggle(device_id);
        self.store.save_favorites(&favorites)?;

        if now {
            println!("★ {} added to favorites", device_id);
        } else {
            println!("☆ {} removed from favorites", device_id);
        }
        Ok(())
    }

    pub async fn select(&mut self, key: &str) -> anyhow::Result<()> {
        self.require_login()?;

        let devices = match self
            .directory
            .list_devices(&mut self.session, &mut self.store)
            .await
        {
            Ok(devices) => devices,
            Err(e @ DirectoryError::SessionExpired(_)) => return Err(self.expire_session(e).await),
            Err(e) => return Err(e.into()),
        };

        let Some(device) = find_device(&devices, key).cloned() else {
            bail!("no device with id or name {:?}", key);
        };

        let device_session = match self
            .directory
            .select_device(&mut self.session, &mut self.store, &device)
            .await
        {
            Ok(selected) => selected,
            Err(e @ DirectoryError::SessionExpired(_)) => return Err(self.expire_session(e).await),
            Err(e) => return Err(e.into()),
        };

        self.store.save_device_session(&device_session)?;
        println!("Selected {} ({})", device_session.device_name, device_session.device_id);
        self.nav.go_to(Screen::RpcConsole);
        Ok(())
    }

    pub async fn probe(&mut self) -> anyhow::Result<()> {
        let Some(device) = self.store.load_device_session() else {
            self.nav.go_to(Screen::DeviceList);
            bail!("no device selected");
        };

        match self.invoker.probe(&self.session, &device).await {
            Ok(()) => {
                println!("Connected: server answers for {}", device.device_name);
                Ok(())
            }
            Err(e) => bail!("{}", e),
        }
    }

    pub async fn invoke(
        &mut self,
        method: Option<String>,
        params: Option<String>,
        timeout: Option<String>,
        template: Option<String>,
    ) -> anyhow::Result<()> {
        self.require_login()?;

        let Some(device) = self.store.load_device_session() else {
            self.nav.go_to(Screen::DeviceList);
            bail!("no device selected");
        };

        let (method, params) = match template {
            Some(name) => {
                let template = self.find_template(&name)?;
                (
                    method.unwrap_or(template.method),
                    params.unwrap_or_else(|| template.params.to_string()),
                )
            }
            None => (method.unwrap_or_default(), params.unwrap_or_default()),
        };

        let default_timeout = self.config.client.rpc_timeout_ms.to_string();
        let timeout = timeout.unwrap_or(default_timeout);
        let request = RpcRequest::parse(&method, &params, Some(timeout.as_str()))?;

        let outcome = self
            .invoker
            .invoke(
                &mut self.session,
                &mut self.store,
                &mut self.history,
                &device,
                &request,
            )
            .await;

        print!("{}", ui::outcome(&outcome));
        if outcome.session_expired() {
            self.session.clear_tokens();
            self.store.save_session(&self.session)?;
            redirect_to_login(&mut self.nav, self.config.client.redirect_delay()).await;
            bail!("session expired");
        }
        if outcome.is_success() {
            Ok(())
        } else {
            bail!("RPC call failed")
        }
    }

    fn find_template(&self, name: &str) -> anyhow::Result<RpcTemplate> {
        let path = self.config.templates_path()?;
        let list = templates::load_templates(&path)?;
        templates::find(&list, name)
            .cloned()
            .with_context(|| format!("no template named {:?} in {}", name, path.display()))
    }

    pub fn templates(&self) -> anyhow::Result<()> {
        let path = self.config.templates_path()?;
        let list = templates::load_templates(&path)?;
        if list.is_empty() {
            println!("No templates in {}", path.display());
        }
        for t in list {
            println!("{:<24} {} {}", t.name, t.method, t.params);
        }
        Ok(())
    }

    pub fn history(&self, limit: usize) -> anyhow::Result<()> {
        let records = self.history.read_recent(limit)?;
        if records.is_empty() {
            println!("No RPC history in {}", self.history.path().display());
        }
        for record in &records {
            println!("{}", ui::history_line(record));
        }
        Ok(())
    }
}
