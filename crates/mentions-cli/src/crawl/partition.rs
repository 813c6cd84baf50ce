//! Splitting a worklist across workers.

use mentions_core::Channel;

/// One live worker: a messaging session, the proxy it connects through, and
/// the channels it reads.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LiveAssignment {
    pub session_id: i32,
    pub proxy_url: String,
    pub channels: Vec<Channel>,
}

/// Pairs sessions with proxies by position; extra sessions or proxies stay
/// idle.
///
/// A channel already bound to a session goes to that session's worker, or is
/// skipped when the session has no proxy this run. Unbound channels are
/// dealt round-robin. Workers left without channels are dropped.
pub(crate) fn partition_live(
    channels: Vec<Channel>,
    session_ids: &[i32],
    proxy_urls: &[String],
) -> Vec<LiveAssignment> {
    let mut assignments: Vec<LiveAssignment> = session_ids
        .iter()
        .zip(proxy_urls)
        .map(|(session_id, proxy_url)| LiveAssignment {
            session_id: *session_id,
            proxy_url: proxy_url.clone(),
            channels: Vec::new(),
        })
        .collect();
    if assignments.is_empty() {
        return assignments;
    }

    let mut next = 0;
    for channel in channels {
        match channel.session_id {
            Some(session) => match assignments.iter_mut().find(|a| a.session_id == session) {
                Some(assignment) => assignment.channels.push(channel),
                None => tracing::warn!(
                    channel = %channel.link,
                    session,
                    "channel bound to a session without a worker, skipping"
                ),
            },
            None => {
                let slot = next % assignments.len();
                assignments[slot].channels.push(channel);
                next += 1;
            }
        }
    }

    assignments.retain(|a| !a.channels.is_empty());
    assignments
}

/// Deals channels by stride: channel `i` goes to chunk `i % workers`, so a
/// worklist sorted by size spreads evenly. Never more than `workers` chunks
/// and never an empty one.
pub(crate) fn partition_directory(channels: Vec<Channel>, workers: usize) -> Vec<Vec<Channel>> {
    let workers = workers.max(1).min(channels.len());
    let mut chunks: Vec<Vec<Channel>> = (0..workers).map(|_| Vec::new()).collect();
    for (index, channel) in channels.into_iter().enumerate() {
        chunks[index % workers].push(channel);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use mentions_core::ContentCategory;

    use super::*;

    fn channel(link: &str, session_id: Option<i32>) -> Channel {
        Channel {
            session_id,
            ..Channel::discovered(link, ContentCategory::ProductAds)
        }
    }

    fn links(channels: &[Channel]) -> Vec<&str> {
        channels.iter().map(|c| c.link.as_str()).collect()
    }

    fn proxies(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("socks5://10.0.0.{i}:1080")).collect()
    }

    #[test]
    fn bound_channels_stay_with_their_session() {
        let assignments = partition_live(
            vec![channel("t.me/a", Some(2)), channel("t.me/b", Some(1))],
            &[1, 2],
            &proxies(2),
        );

        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].session_id, 1);
        assert_eq!(links(&assignments[0].channels), vec!["t.me/b"]);
        assert_eq!(links(&assignments[1].channels), vec!["t.me/a"]);
        assert_eq!(assignments[1].proxy_url, "socks5://10.0.0.1:1080");
    }

    #[test]
    fn unbound_channels_are_dealt_round_robin() {
        let assignments = partition_live(
            vec![
                channel("t.me/a", None),
                channel("t.me/b", None),
                channel("t.me/c", None),
            ],
            &[1, 2],
            &proxies(2),
        );

        assert_eq!(links(&assignments[0].channels), vec!["t.me/a", "t.me/c"]);
        assert_eq!(links(&assignments[1].channels), vec!["t.me/b"]);
    }

    #[test]
    fn workers_are_limited_by_proxies() {
        let assignments = partition_live(
            vec![channel("t.me/a", Some(3)), channel("t.me/b", None)],
            &[1, 2, 3],
            &proxies(1),
        );

        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].session_id, 1);
        assert_eq!(links(&assignments[0].channels), vec!["t.me/b"]);
    }

    #[test]
    fn no_sessions_means_no_workers() {
        assert!(partition_live(vec![channel("t.me/a", None)], &[], &proxies(3)).is_empty());
    }

    #[test]
    fn directory_channels_are_dealt_by_stride() {
        let channels: Vec<Channel> = (0..5).map(|i| channel(&format!("t.me/c{i}"), None)).collect();

        let chunks = partition_directory(channels, 2);

        assert_eq!(chunks.len(), 2);
        assert_eq!(links(&chunks[0]), vec!["t.me/c0", "t.me/c2", "t.me/c4"]);
        assert_eq!(links(&chunks[1]), vec!["t.me/c1", "t.me/c3"]);
    }

    #[test]
    fn zero_workers_still_gets_one_chunk() {
        let chunks = partition_directory(vec![channel("t.me/a", None), channel("t.me/b", None)], 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(links(&chunks[0]), vec!["t.me/a", "t.me/b"]);
    }

    #[test]
    fn directory_never_makes_empty_chunks() {
        let chunks = partition_directory(vec![channel("t.me/a", None)], 4);
        assert_eq!(chunks.len(), 1);
        assert!(partition_directory(Vec::new(), 4).is_empty());
    }
}
