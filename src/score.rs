use crate::models::{Landmark, RankedLandmark};

/// Saturation rate of the visit-count weight.
pub const VISIT_WEIGHT_RATE: f64 = 0.1;

/// Number of landmarks shown in the "top" list.
pub const TOP_LANDMARKS: usize = 10;

/// score
///
/// Popularity-weighted rating: `average_rating * (1 - e^(-0.1 * visit_count))`.
///
/// Zero for an unvisited landmark, strictly increasing in `visit_count` for a positive
/// rating, and approaching `average_rating` as visits grow.
pub fn score(average_rating: f64, visit_count: u32) -> f64 {
    average_rating * (1.0 - (-VISIT_WEIGHT_RATE * f64::from(visit_count)).exp())
}

/// Score of a stored landmark. A negative visit count is treated as zero.
pub fn landmark_score(landmark: &Landmark) -> f64 {
    score(
        landmark.average_rating,
        u32::try_from(landmark.visit_count).unwrap_or(0),
    )
}

/// rank
///
/// Attaches scores and orders highest first. The sort is stable, so landmarks with equal
/// scores keep the order they were fetched in.
pub fn rank<'a, I>(landmarks: I) -> Vec<RankedLandmark>
where
    I: IntoIterator<Item = &'a Landmark>,
{
    let mut ranked: Vec<RankedLandmark> = landmarks
        .into_iter()
        .map(|landmark| RankedLandmark {
            score: landmark_score(landmark),
            landmark: landmark.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// The `n` highest-scoring landmarks.
pub fn top<'a, I>(landmarks: I, n: usize) -> Vec<RankedLandmark>
where
    I: IntoIterator<Item = &'a Landmark>,
{
    let mut ranked = rank(landmarks);
    ranked.truncate(n);
    ranked
}
