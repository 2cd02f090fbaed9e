// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::format::{self, CHANNEL_NAME_CAP};
use crate::models::server::TrackedServer;
use crate::utils::{authorize, unix_now, AdminError, AdminRateLimiter};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddServerRequest {
    server_id: String,
    #[serde(default)]
    custom_name: Option<String>,
    #[serde(default)]
    registered_by: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    #[serde(default)]
    game: Option<String>,
}

pub async fn add_server(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
    body: web::Json<AddServerRequest>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let guild_id = guild.into_inner();
    let body = body.into_inner();
    let server_id = body.server_id.trim().to_string();
    if server_id.is_empty() {
        return Err(AdminError::BadRequest("A server ID is required.".to_string()));
    }

    let registry = state.reconciler.registry();
    let channels = state.reconciler.sink().api();

    let category_id = registry.category_id(&guild_id).ok_or_else(|| {
        AdminError::BadRequest(format!(
            "Please set a category first with PUT /guilds/{}/category",
            guild_id
        ))
    })?;
    let category_exists = channels
        .channel_name(&category_id)
        .await
        .map_err(|e| AdminError::Upstream(format!("Failed to look up category: {}", e)))?
        .is_some();
    if !category_exists {
        return Err(AdminError::BadRequest(
            "The configured category no longer exists. Please set a new one.".to_string(),
        ));
    }

    if registry.tracked_server(&guild_id, &server_id).is_some() {
        return Err(AdminError::Conflict("That server is already being tracked.".to_string()));
    }

    let token = registry.global().api_token;
    let snapshot = state
        .reconciler
        .source()
        .fetch(&server_id, token.as_deref())
        .await
        .ok_or_else(|| {
            AdminError::NotFound(
                "Could not find that server on BattleMetrics. Please check the server ID and try again."
                    .to_string(),
            )
        })?;

    let name = body
        .custom_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| snapshot.name.clone());
    let template = registry.channel_format(&guild_id);
    let channel_name = format::channel_name(&template, &snapshot, Some(name.as_str()), CHANNEL_NAME_CAP);

    let channel_id = channels
        .create_channel(
            &guild_id,
            &category_id,
            &channel_name,
            &format!("BattleMetrics tracker for server {}", server_id),
        )
        .await
        .map_err(|e| AdminError::Upstream(format!("Failed to create voice channel: {}", e)))?;

    let entry = TrackedServer {
        channel_id: channel_id.clone(),
        name: name.clone(),
        registered_by: body.registered_by,
        registered_at: unix_now(),
    };
    if let Err(e) = registry.insert_server(&guild_id, &server_id, entry).await {
        if let Err(delete_err) = channels.delete_channel(&channel_id, "BattleMetrics tracker not saved").await {
            warn!("Could not delete channel {} after failed save: {}", channel_id, delete_err);
        }
        return Err(e.into());
    }
    info!("Guild {} now tracking {} ({}) in channel {}", guild_id, name, server_id, channel_id);

    Ok(HttpResponse::Created().json(json!({
        "serverId": server_id,
        "name": name,
        "players": snapshot.players,
        "maxPlayers": snapshot.max_players,
        "channelId": channel_id,
        "channelName": channel_name,
    })))
}

pub async fn remove_server(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let (guild_id, server_id) = path.into_inner();
    let registry = state.reconciler.registry();

    let entry = registry
        .tracked_server(&guild_id, &server_id)
        .ok_or_else(|| AdminError::NotFound("That server is not being tracked.".to_string()))?;

    // Best effort: a channel deleted by hand should not block removal.
    if let Err(e) = state
        .reconciler
        .sink()
        .api()
        .delete_channel(&entry.channel_id, "BattleMetrics tracker removed")
        .await
    {
        warn!("Could not delete channel {} for server {}: {}", entry.channel_id, server_id, e);
    }

    registry.remove_server(&guild_id, &server_id).await?;
    info!("Guild {} stopped tracking {} ({})", guild_id, entry.name, server_id);

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Removed {} (ID: {}) from tracking.", entry.name, server_id)
    })))
}

pub async fn list_servers(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let guild_id = guild.into_inner();
    let mut servers = state.reconciler.registry().tracked_servers(&guild_id);
    servers.sort_by(|a, b| a.0.cmp(&b.0));

    let api = state.reconciler.sink().api();
    let mut listed = Vec::with_capacity(servers.len());
    for (server_id, entry) in servers {
        let channel_exists = matches!(api.channel_name(&entry.channel_id).await, Ok(Some(_)));
        listed.push(json!({
            "serverId": server_id,
            "name": entry.name,
            "channelId": entry.channel_id,
            "channelExists": channel_exists,
            "registeredBy": entry.registered_by,
            "registeredAt": entry.registered_at,
        }));
    }

    Ok(HttpResponse::Ok().json(json!({ "servers": listed })))
}

pub async fn refresh_servers(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let guild_id = guild.into_inner();
    if state.reconciler.registry().tracked_servers(&guild_id).is_empty() {
        return Err(AdminError::BadRequest("No servers are being tracked.".to_string()));
    }

    let report = state.reconciler.refresh_tenant(&guild_id).await?;
    info!("Manual refresh of guild {}: {:?}", guild_id, report);
    Ok(HttpResponse::Ok().json(report))
}

pub async fn server_info(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    server_id: web::Path<String>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let server_id = server_id.into_inner();
    let token = state.reconciler.registry().global().api_token;
    let snapshot = state
        .reconciler
        .source()
        .fetch(&server_id, token.as_deref())
        .await
        .ok_or_else(|| AdminError::NotFound("Could not fetch server information.".to_string()))?;

    let address = snapshot.ip.as_ref().map(|ip| match snapshot.port {
        Some(port) => format!("{}:{}", ip, port),
        None => ip.clone(),
    });
    let url = format!(
        "https://www.battlemetrics.com/servers/{}/{}",
        snapshot.game.as_deref().unwrap_or("unknown"),
        server_id
    );

    Ok(HttpResponse::Ok().json(json!({
        "serverId": server_id,
        "name": snapshot.name,
        "players": snapshot.players,
        "maxPlayers": snapshot.max_players,
        "status": snapshot.status,
        "game": snapshot.game,
        "address": address,
        "country": snapshot.country,
        "rank": snapshot.rank,
        "url": url,
    })))
}

pub async fn search_servers(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let query = query.into_inner();
    if query.q.trim().is_empty() {
        return Err(AdminError::BadRequest("A search query is required.".to_string()));
    }
    let game = query.game.unwrap_or_else(|| state.config.search_game.clone());
    let token = state.reconciler.registry().global().api_token;

    let hits = state
        .reconciler
        .source()
        .search(&query.q, &game, state.config.search_page_size, token.as_deref())
        .await
        .map_err(|e| AdminError::Upstream(format!("Failed to search servers: {}", e)))?;

    let results: Vec<_> = hits
        .into_iter()
        .take(state.config.search_page_size as usize)
        .map(|hit| {
            json!({
                "serverId": hit.id,
                "name": hit.snapshot.name,
                "players": hit.snapshot.players,
                "maxPlayers": hit.snapshot.max_players,
                "status": hit.snapshot.status,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "query": query.q, "results": results })))
}
