#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub score: i64,
}

/// Numbers behind the leaderboard card.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardSummary {
    /// 1-based competition rank ("1224"); `None` if the user has no entry.
    pub rank: Option<u32>,
    pub total: u32,
    /// Share of other players the user beats or ties, 0-100.
    pub percentile: u8,
    pub user_score: Option<i64>,
    pub leader_score: Option<i64>,
}

pub fn summarize(entries: &[LeaderboardEntry], user_id: &str) -> LeaderboardSummary {
    let total = entries.len() as u32;
    let leader_score = entries.iter().map(|e| e.score).max();
    let user_score = entries
        .iter()
        .filter(|e| e.user_id == user_id)
        .map(|e| e.score)
        .max();

    let Some(score) = user_score else {
        return LeaderboardSummary {
            rank: None,
            total,
            percentile: 0,
            user_score: None,
            leader_score,
        };
    };

    let ahead = entries.iter().filter(|e| e.score > score).count() as u32;
    let others = total.saturating_sub(1);
    let percentile = if others == 0 {
        100
    } else {
        let not_ahead = others.saturating_sub(ahead);
        (u64::from(not_ahead) * 100 / u64::from(others)) as u8
    };

    LeaderboardSummary {
        rank: Some(ahead + 1),
        total,
        percentile,
        user_score: Some(score),
        leader_score,
    }
}
