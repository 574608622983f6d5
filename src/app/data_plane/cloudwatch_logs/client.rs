//! CloudWatch Logs Client Wrapper
//!
//! Implements [`LogService`] on top of the AWS SDK. Credentials, profiles
//! and regions are resolved by `aws-config`'s default provider chain.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatchlogs as cloudwatchlogs;
use aws_sdk_cloudwatchlogs::types::OrderBy;
use aws_types::region::Region;

use super::service::LogService;
use super::types::{EventPage, FilterRequest, FilteredEvent, StreamPage, StreamSummary};

/// CloudWatch Logs client wrapper
#[derive(Clone, Debug)]
pub struct CloudWatchLogsClient {
    client: cloudwatchlogs::Client,
}

impl CloudWatchLogsClient {
    /// Wrap an existing SDK client
    pub fn new(client: cloudwatchlogs::Client) -> Self {
        Self { client }
    }

    /// Build a client from the environment, optionally pinning profile and region
    pub async fn from_env(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let aws_config = loader.load().await;

        trace_debug!(
            "Created CloudWatch Logs client (profile: {:?}, region: {:?})",
            profile,
            aws_config.region()
        );
        Self::new(cloudwatchlogs::Client::new(&aws_config))
    }
}

#[async_trait]
impl LogService for CloudWatchLogsClient {
    async fn list_streams_page(
        &self,
        log_group: &str,
        next_token: Option<String>,
    ) -> Result<StreamPage> {
        let response = self
            .client
            .describe_log_streams()
            .log_group_name(log_group)
            .order_by(OrderBy::LastEventTime)
            .descending(true)
            .set_next_token(next_token)
            .send()
            .await
            .with_context(|| format!("DescribeLogStreams failed for log group: {}", log_group))?;

        let streams = response
            .log_streams
            .unwrap_or_default()
            .into_iter()
            .filter_map(|stream| {
                Some(StreamSummary {
                    name: stream.log_stream_name?,
                    first_event_time: stream.first_event_timestamp,
                    last_event_time: stream.last_event_timestamp,
                })
            })
            .collect();

        Ok(StreamPage {
            streams,
            next_token: response.next_token,
        })
    }

    async fn filter_events_page(&self, request: &FilterRequest) -> Result<EventPage> {
        let response = self
            .client
            .filter_log_events()
            .log_group_name(&request.log_group)
            .set_log_stream_names(Some(request.stream_names.clone()))
            .start_time(request.start_time)
            .set_end_time(request.end_time)
            .set_filter_pattern(request.filter_pattern.clone())
            .set_next_token(request.next_token.clone())
            .send()
            .await
            .with_context(|| {
                format!(
                    "FilterLogEvents failed for log group: {}",
                    request.log_group
                )
            })?;

        let events = response
            .events
            .unwrap_or_default()
            .into_iter()
            .map(|event| FilteredEvent {
                event_id: event.event_id,
                stream_name: event.log_stream_name,
                timestamp: event.timestamp,
                message: event.message,
            })
            .collect();

        Ok(EventPage {
            events,
            next_token: response.next_token,
        })
    }
}
