// src/handlers/settings.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::utils::{authorize, AdminError, AdminRateLimiter};

#[derive(Deserialize)]
pub struct TokenRequest {
    token: Option<String>,
}

#[derive(Deserialize)]
pub struct IntervalRequest {
    seconds: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    category_id: String,
}

#[derive(Deserialize)]
pub struct FormatRequest {
    format: String,
}

pub async fn set_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    body: web::Json<TokenRequest>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let token = body.into_inner().token.filter(|t| !t.trim().is_empty());
    let set = token.is_some();
    state.reconciler.registry().set_api_token(token).await?;
    info!("BattleMetrics API token {}", if set { "set" } else { "cleared" });

    let message = if set { "API token has been set." } else { "API token has been cleared." };
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

pub async fn set_interval(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    body: web::Json<IntervalRequest>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    state.reconciler.registry().set_update_interval(body.seconds).await?;
    info!("Update interval set to {}s", body.seconds);
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Update interval set to {} seconds.", body.seconds)
    })))
}

pub async fn show_settings(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let guild_id = guild.into_inner();
    let registry = state.reconciler.registry();
    let global = registry.global();

    let category_id = registry.category_id(&guild_id);
    let category_name = match &category_id {
        Some(id) => state.reconciler.sink().api().channel_name(id).await.unwrap_or_else(|e| {
            error!("Failed to look up category {}: {}", id, e);
            None
        }),
        None => None,
    };

    Ok(HttpResponse::Ok().json(json!({
        "categoryId": category_id,
        "categoryName": category_name,
        "updateIntervalSeconds": global.update_interval_secs,
        "apiTokenSet": global.api_token.is_some(),
        "channelFormat": registry.channel_format(&guild_id),
        "trackedServers": registry.tracked_servers(&guild_id).len(),
    })))
}

pub async fn set_category(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
    body: web::Json<CategoryRequest>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let guild_id = guild.into_inner();
    let category_id = body.into_inner().category_id;

    let channel = state
        .reconciler
        .sink()
        .api()
        .channel(&category_id)
        .await
        .map_err(|e| AdminError::Upstream(format!("Failed to look up category: {}", e)))?
        .ok_or_else(|| AdminError::NotFound("That category does not exist.".to_string()))?;
    if !channel.is_category_in(&guild_id) {
        return Err(AdminError::BadRequest(
            "That channel is not a category in this server.".to_string(),
        ));
    }
    let name = channel.name;

    state.reconciler.registry().set_category(&guild_id, category_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Server info channels will be created in: {}", name)
    })))
}

pub async fn set_format(
    req: HttpRequest,
    state: web::Data<AppState>,
    limiter: web::Data<AdminRateLimiter>,
    guild: web::Path<String>,
    body: web::Json<FormatRequest>,
) -> Result<HttpResponse, AdminError> {
    authorize(&req, &state.config, &limiter)?;

    let format = body.into_inner().format;
    if format.trim().is_empty() {
        return Err(AdminError::BadRequest("Channel format cannot be empty.".to_string()));
    }

    let guild_id = guild.into_inner();
    state.reconciler.registry().set_channel_format(&guild_id, format.clone()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Channel format set to: {}", format)
    })))
}
