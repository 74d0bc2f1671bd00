/// Read-through caching for catalog lookups.
///
/// Returns the value stored under `$key` when present. Otherwise awaits
/// `$block`, hands the result to the background writer with `$ttl` seconds of
/// expiry, and returns it. Both the cache read and the block propagate errors
/// with `?`, so the surrounding function must return `AppResult`.
///
/// # Example
/// ```rust,ignore
/// let genres: AppResult<Vec<TmdbGenre>> = cached!(cache, CacheKey::GenreList(lang), 86_400, async move {
///     fetch_genres(&lang).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
