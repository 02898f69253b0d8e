//! 업스트림 제공자 진단.
//!
//! 설정된 API 키로 실제 조회를 실행해 키별 성공 여부와 응답 시간을 보고합니다.
//! 새로고침 상태나 캐시는 건드리지 않습니다.
//!
//! - `single`: 현재 커서의 키로 1회
//! - `multi`: 모든 키로 동시에 1회씩
//! - `sequential`: 키를 돌아가며 `count`회 연속 호출 (호출 사이 100ms)

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

use crate::error::{DataError, Result};
use crate::provider::{ProviderError, QuoteProvider};
use crate::token::{Credential, TokenRotator};

/// 연속 호출 사이 대기.
const SEQUENTIAL_PAUSE: Duration = Duration::from_millis(100);

/// 연속 호출 최대 횟수.
pub const MAX_SEQUENTIAL_CALLS: usize = 20;

/// 진단 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticMode {
    Single,
    Multi,
    Sequential,
}

impl DiagnosticMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticMode::Single => "single",
            DiagnosticMode::Multi => "multi",
            DiagnosticMode::Sequential => "sequential",
        }
    }
}

impl fmt::Display for DiagnosticMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosticMode {
    type Err = DataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(DiagnosticMode::Single),
            "multi" => Ok(DiagnosticMode::Multi),
            "sequential" => Ok(DiagnosticMode::Sequential),
            other => Err(DataError::Config(format!(
                "invalid test type '{}'. Use: single, multi, or sequential",
                other
            ))),
        }
    }
}

/// 호출 1회의 결과.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCall {
    /// 호출 순번 (1부터)
    pub call_index: usize,
    /// 사용한 키 위치
    pub token_index: usize,
    /// 마스킹된 키
    pub token: String,
    pub success: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 키 순환 대상 오류(요청 한도/인증)였는지
    pub rotation_error: bool,
}

/// 진단 보고서.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub provider: String,
    pub symbol: String,
    pub mode: DiagnosticMode,
    pub total_tokens: usize,
    pub total_elapsed_ms: u64,
    pub average_elapsed_ms: u64,
    pub success_count: usize,
    pub calls: Vec<DiagnosticCall>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// 제공자 + 키 목록에 대한 진단 실행기.
pub struct ProviderDiagnostics<'a> {
    provider: &'a dyn QuoteProvider,
    tokens: &'a TokenRotator,
    timeout: Duration,
}

impl<'a> ProviderDiagnostics<'a> {
    pub fn new(
        provider: &'a dyn QuoteProvider,
        tokens: &'a TokenRotator,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            tokens,
            timeout,
        }
    }

    /// 진단을 실행합니다. 키가 없으면 `NoCredentialsAvailable`.
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn run(
        &self,
        symbol: &str,
        mode: DiagnosticMode,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<DiagnosticReport> {
        if self.tokens.is_empty() {
            return Err(DataError::NoCredentialsAvailable);
        }

        let started = Instant::now();
        let calls = match mode {
            DiagnosticMode::Single => {
                let credential = self.tokens.current()?;
                vec![self.call(1, symbol, credential).await]
            }
            DiagnosticMode::Multi => {
                let requests = (0..self.tokens.len())
                    .filter_map(|i| self.tokens.get(i))
                    .enumerate()
                    .map(|(n, credential)| self.call(n + 1, symbol, credential));
                join_all(requests).await
            }
            DiagnosticMode::Sequential => {
                let count = count.clamp(1, MAX_SEQUENTIAL_CALLS);
                let mut calls = Vec::with_capacity(count);
                for n in 0..count {
                    if n > 0 {
                        tokio::time::sleep(SEQUENTIAL_PAUSE).await;
                    }
                    if let Some(credential) = self.tokens.get(n % self.tokens.len()) {
                        calls.push(self.call(n + 1, symbol, credential).await);
                    }
                }
                calls
            }
        };

        let total_elapsed_ms = started.elapsed().as_millis() as u64;
        let success_count = calls.iter().filter(|c| c.success).count();
        let average_elapsed_ms = if calls.is_empty() {
            0
        } else {
            calls.iter().map(|c| c.elapsed_ms).sum::<u64>() / calls.len() as u64
        };

        info!(
            symbol,
            mode = mode.as_str(),
            calls = calls.len(),
            success = success_count,
            total_elapsed_ms,
            "제공자 진단 완료"
        );

        Ok(DiagnosticReport {
            provider: self.provider.name().to_string(),
            symbol: symbol.to_string(),
            mode,
            total_tokens: self.tokens.len(),
            total_elapsed_ms,
            average_elapsed_ms,
            success_count,
            calls,
            timestamp: now,
        })
    }

    async fn call(
        &self,
        call_index: usize,
        symbol: &str,
        credential: Credential<'_>,
    ) -> DiagnosticCall {
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            self.provider.fetch_quote(symbol, &credential),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "{}s elapsed",
                self.timeout.as_secs()
            ))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut call = DiagnosticCall {
            call_index,
            token_index: credential.index,
            token: credential.masked(),
            success: false,
            elapsed_ms,
            current_value: None,
            change_percent: None,
            error: None,
            rotation_error: false,
        };
        match result {
            Ok(quote) => {
                call.success = true;
                call.current_value = Some(quote.current_value);
                call.change_percent = Some(quote.change_percent);
            }
            Err(e) => {
                call.rotation_error = e.triggers_rotation();
                call.error = Some(e.to_string());
            }
        }
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SelectionPolicy;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use quote_core::LiveQuote;
    use std::sync::Mutex;

    /// 두 번째 키만 요청 한도에 걸린 제공자.
    struct SecondKeyLimited {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl QuoteProvider for SecondKeyLimited {
        fn name(&self) -> &str {
            "limited"
        }

        async fn fetch_quote(
            &self,
            _symbol: &str,
            credential: &Credential<'_>,
        ) -> std::result::Result<LiveQuote, ProviderError> {
            self.seen.lock().unwrap().push(credential.index);
            match credential.index {
                1 => Err(ProviderError::RateLimited),
                _ => Ok(LiveQuote::new(212.5, 1.2)),
            }
        }
    }

    fn provider() -> SecondKeyLimited {
        SecondKeyLimited {
            seen: Mutex::new(Vec::new()),
        }
    }

    fn two_tokens() -> TokenRotator {
        TokenRotator::new(["key-zero-0000", "key-one-11111"], SelectionPolicy::RoundRobin)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("MULTI".parse::<DiagnosticMode>().unwrap(), DiagnosticMode::Multi);
        assert!(matches!(
            "burst".parse::<DiagnosticMode>(),
            Err(DataError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_multi_reports_every_token() {
        let provider = provider();
        let tokens = TokenRotator::new(
            ["aaaaaaaa-key-0000", "bbbbbbbb-key-1111", "cccccccc-key-2222"],
            SelectionPolicy::RoundRobin,
        );
        let report = ProviderDiagnostics::new(&provider, &tokens, Duration::from_secs(5))
            .run("AAPL", DiagnosticMode::Multi, 0, now())
            .await
            .unwrap();

        assert_eq!(report.total_tokens, 3);
        assert_eq!(report.success_count, 2);
        let indexes: Vec<usize> = report.calls.iter().map(|c| c.token_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(report.calls[1].rotation_error);
        assert_eq!(report.calls[1].token, "bbbbbbbb...1111");
        assert_eq!(report.calls[0].current_value, Some(212.5));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "multi");
        assert!(json["calls"][0].get("error").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_cycles_tokens() {
        let provider = provider();
        let tokens = two_tokens();
        let report = ProviderDiagnostics::new(&provider, &tokens, Duration::from_secs(5))
            .run("AAPL", DiagnosticMode::Sequential, 5, now())
            .await
            .unwrap();

        assert_eq!(*provider.seen.lock().unwrap(), vec![0, 1, 0, 1, 0]);
        assert_eq!(report.calls.len(), 5);
        assert_eq!(report.success_count, 3);
    }

    #[tokio::test]
    async fn test_single_uses_current_token_without_rotating() {
        let provider = provider();
        let tokens = two_tokens();
        tokens.rotate();

        let report = ProviderDiagnostics::new(&provider, &tokens, Duration::from_secs(5))
            .run("AAPL", DiagnosticMode::Single, 0, now())
            .await
            .unwrap();

        assert_eq!(report.calls.len(), 1);
        assert!(!report.calls[0].success);
        // 진단은 커서를 옮기지 않는다
        assert_eq!(tokens.current().unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_no_tokens() {
        let provider = provider();
        let tokens = TokenRotator::new(Vec::<String>::new(), SelectionPolicy::RoundRobin);
        let result = ProviderDiagnostics::new(&provider, &tokens, Duration::from_secs(5))
            .run("AAPL", DiagnosticMode::Multi, 0, now())
            .await;
        assert!(matches!(result, Err(DataError::NoCredentialsAvailable)));
    }
}
