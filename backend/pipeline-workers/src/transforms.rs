//! Pure payload transforms for the content publishing chain.
//!
//! Each builder validates its input before deriving the next payload, so the
//! functions are safe to call outside a stage processor.

use event_schema::{
    ContractError, EpisodePublishedV1, EventContract, MediaApprovedV1, MediaRendition,
    MediaReviewedV1, MediaTranscodeRequestedV1, MediaTranscodedV1, MediaUploadedV1,
};

pub const POLICY_VERDICT: &str = "approved";
pub const DEFAULT_AGE_BAND: &str = "6-11";
pub const DEFAULT_LEARNING_TAGS: [&str; 2] = ["farben", "teamwork"];

const RENDITION_PROFILES: [&str; 2] = ["1080p", "720p"];
const TRANSCODED_DURATION_MS: i64 = 660_000;
const EPISODE_ID_MAX_LEN: usize = 14;

pub fn build_transcode_request(
    input: &MediaUploadedV1,
) -> Result<MediaTranscodeRequestedV1, ContractError> {
    input.validate()?;
    Ok(MediaTranscodeRequestedV1 {
        asset_id: input.asset_id.clone(),
        source_url: input.source_url.clone(),
        trace_id: input.trace_id.clone(),
    })
}

pub fn build_transcoded_media(
    input: &MediaTranscodeRequestedV1,
) -> Result<MediaTranscodedV1, ContractError> {
    input.validate()?;
    let renditions = RENDITION_PROFILES
        .iter()
        .map(|profile| MediaRendition {
            profile: profile.to_string(),
            url: format!("https://cdn.example.local/{}/{}.m3u8", input.asset_id, profile),
        })
        .collect();

    Ok(MediaTranscodedV1 {
        asset_id: input.asset_id.clone(),
        renditions,
        duration_ms: TRANSCODED_DURATION_MS,
    })
}

/// Fixed verdict: every transcoded asset is approved for the default age band.
pub fn build_policy_outputs(
    input: &MediaTranscodedV1,
) -> Result<(MediaReviewedV1, MediaApprovedV1), ContractError> {
    input.validate()?;
    let reviewed = MediaReviewedV1 {
        asset_id: input.asset_id.clone(),
        policy_result: POLICY_VERDICT.to_string(),
        age_band: DEFAULT_AGE_BAND.to_string(),
    };
    let approved = MediaApprovedV1 {
        asset_id: input.asset_id.clone(),
        age_band: DEFAULT_AGE_BAND.to_string(),
        learning_tags: DEFAULT_LEARNING_TAGS.iter().map(|t| t.to_string()).collect(),
    };
    Ok((reviewed, approved))
}

pub fn build_episode_published(
    input: &MediaApprovedV1,
) -> Result<EpisodePublishedV1, ContractError> {
    input.validate()?;
    Ok(EpisodePublishedV1 {
        episode_id: episode_id_for(&input.asset_id),
        age_band: input.age_band.clone(),
        learning_tags: input.learning_tags.clone(),
    })
}

/// `"ep-"` followed by the asset ID without dashes, capped at 14 characters.
pub fn episode_id_for(asset_id: &str) -> String {
    format!("ep-{}", asset_id.replace('-', ""))
        .chars()
        .take(EPISODE_ID_MAX_LEN)
        .collect()
}
