use crate::{
    error::{ApiError, AppError},
    middleware::auth::AuthContext,
    state::{AppState, RequestId},
};
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

/// Token bucket per API key, or per path for public routes. A no-op when
/// Redis is not configured; a Redis outage lets traffic through.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let bucket = match req.extensions().get::<AuthContext>() {
        Some(auth) => format!("key:{}", auth.key_id),
        None => format!("public:{}", req.uri().path()),
    };
    let capacity = state.settings.rate_limit_per_min;

    let allowed = match redis.get_multiplexed_async_connection().await {
        Ok(mut conn) => allow_request(&mut conn, &bucket, capacity, capacity).await,
        Err(err) => Err(err),
    };

    match allowed {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::info!(bucket = %bucket, "rate limited");
            Err(AppError::RateLimited.with_request_id(&request_id))
        }
        Err(err) => {
            tracing::warn!(error = %err, "rate limiter unavailable");
            Ok(next.run(req).await)
        }
    }
}

async fn allow_request(
    conn: &mut redis::aio::MultiplexedConnection,
    bucket: &str,
    capacity: u32,
    refill_per_min: u32,
) -> redis::RedisResult<bool> {
    let now = chrono::Utc::now().timestamp();
    let bucket_key = format!("nh:rl:{}", bucket);

    let script = r#"
local bucket = KEYS[1]
local now = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local refill = tonumber(ARGV[3])

local data = redis.call('HMGET', bucket, 'tokens', 'ts')
local tokens = tonumber(data[1]) or capacity
local ts = tonumber(data[2]) or now

local delta = math.max(0, now - ts)
local available = math.min(capacity, tokens + (delta * refill / 60))
local allowed = 0
if available >= 1 then
  available = available - 1
  allowed = 1
end

redis.call('HSET', bucket, 'tokens', available, 'ts', now)
redis.call('EXPIRE', bucket, 120)
return allowed
"#;

    let allowed: i32 = redis::Script::new(script)
        .key(bucket_key)
        .arg(now)
        .arg(capacity)
        .arg(refill_per_min)
        .invoke_async(conn)
        .await?;

    Ok(allowed == 1)
}
