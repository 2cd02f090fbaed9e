pub mod index;
pub mod servers;
pub mod settings;


use actix_web::web;

use crate::config::Config;
use crate::reconcile::Reconciler;

/// Shared state behind every admin route.
pub struct AppState {
    pub reconciler: Reconciler,
    pub config: Config,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index::index))
        .route("/settings/token", web::put().to(settings::set_token))
        .route("/settings/interval", web::put().to(settings::set_interval))
        .route("/guilds/{guild}/settings", web::get().to(settings::show_settings))
        .route("/guilds/{guild}/category", web::put().to(settings::set_category))
        .route("/guilds/{guild}/format", web::put().to(settings::set_format))
        .route("/guilds/{guild}/servers", web::get().to(servers::list_servers))
        .route("/guilds/{guild}/servers", web::post().to(servers::add_server))
        .route("/guilds/{guild}/servers/{server_id}", web::delete().to(servers::remove_server))
        .route("/guilds/{guild}/refresh", web::post().to(servers::refresh_servers))
        .route("/servers", web::get().to(servers::search_servers))
        .route("/servers/{server_id}", web::get().to(servers::server_info));
}
