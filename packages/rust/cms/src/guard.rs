//! Outbound URL checks for asset downloads.
//!
//! Hero image URLs come from users, so downloads are refused for
//! non-HTTP schemes and private/loopback hosts.

use std::net::IpAddr;

use reqwest::redirect::Policy;
use url::Url;

/// Redirect hops followed for one asset download.
const MAX_REDIRECTS: usize = 5;

/// Check if a URL targets a potentially dangerous resource.
pub(crate) fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    let Some(host) = url.host_str() else {
        return true;
    };

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10
                || (a == 100 && (b & 0xC0) == 64)
                || (a == 192 && b == 0 && c == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Whether an asset download may follow a redirect to `next`, given the
/// number of hops already taken.
pub(crate) fn check_redirect(
    next: &Url,
    hops: usize,
    allow_private_hosts: bool,
) -> std::result::Result<(), String> {
    if hops >= MAX_REDIRECTS {
        return Err(format!("too many redirects (max {MAX_REDIRECTS})"));
    }
    if !allow_private_hosts && is_ssrf_target(next) {
        return Err(format!("refusing redirect to {next}"));
    }
    Ok(())
}

/// Redirect policy that re-checks every hop of an asset download.
pub(crate) fn asset_redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        match check_redirect(attempt.url(), attempt.previous().len(), allow_private_hosts) {
            Ok(()) => attempt.follow(),
            Err(reason) => attempt.error(reason),
        }
    })
}

/// File name for an uploaded asset, from the last URL path segment.
pub(crate) fn asset_filename(url: &Url, mime: &str) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    match last {
        Some(name) if name.contains('.') => name,
        Some(name) => format!("{name}.{}", extension_for(mime)),
        None => format!("hero.{}", extension_for(mime)),
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => "jpg",
    }
}
