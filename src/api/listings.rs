/// Listing search, authoring and edit announcements
use crate::{
    auth::AuthContext,
    catalog::{EditNotificationOutcome, EditOutcome, EditRecord, Listing, ListingDraft, ListingUpdate, SearchPage, SearchQuery},
    context::AppContext,
    error::MarketResult,
    storage::SignedDownload,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/listings", get(search).post(create))
        .route("/api/listings/:id", get(get_listing).put(edit))
        .route("/api/listings/:id/edits", get(list_edits))
        .route("/api/listings/:id/edits/:edit_id/notify", post(notify_purchasers))
        .route("/api/listings/:id/download", post(download))
}

async fn search(
    State(ctx): State<AppContext>,
    Query(query): Query<SearchQuery>,
) -> MarketResult<Json<SearchPage>> {
    Ok(Json(ctx.listings.search(&query).await?))
}

async fn create(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(draft): Json<ListingDraft>,
) -> MarketResult<(StatusCode, Json<Listing>)> {
    let listing = ctx.listings.create_listing(auth.account_id(), &draft).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn get_listing(State(ctx): State<AppContext>, Path(id): Path<String>) -> MarketResult<Json<Listing>> {
    Ok(Json(ctx.listings.get_listing(&id).await?))
}

async fn edit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(update): Json<ListingUpdate>,
) -> MarketResult<Json<EditOutcome>> {
    Ok(Json(ctx.listings.edit_listing(auth.account_id(), &id, &update).await?))
}

async fn list_edits(State(ctx): State<AppContext>, Path(id): Path<String>) -> MarketResult<Json<Vec<EditRecord>>> {
    Ok(Json(ctx.listings.list_edits(&id).await?))
}

async fn notify_purchasers(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((id, edit_id)): Path<(String, i64)>,
) -> MarketResult<Json<EditNotificationOutcome>> {
    let outcome = ctx
        .listings
        .send_edit_notification(auth.account_id(), &id, edit_id)
        .await?;
    Ok(Json(outcome))
}

async fn download(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> MarketResult<Json<SignedDownload>> {
    Ok(Json(ctx.files.sign_download(auth.account_id(), &id).await?))
}
