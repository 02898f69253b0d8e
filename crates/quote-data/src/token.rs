//! 업스트림 API 키 순환.
//!
//! 키 목록은 시작 시 한 번 로드되며 이후 불변입니다. 순환 커서만 원자적으로 변경됩니다.
//! 요청 한도(429)나 인증(401/403) 오류를 받으면 호출자가 [`TokenRotator::rotate_from`]으로
//! 다음 키로 넘깁니다.

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::error::{DataError, Result};

/// 다음 키 선택 방식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// 목록 순서대로 순환
    #[default]
    RoundRobin,
    /// 현재 키를 제외한 키 중 균등 무작위
    Random,
}

/// 요청 하나에 사용할 키.
#[derive(Clone, Copy)]
pub struct Credential<'a> {
    /// 키 목록 내 위치
    pub index: usize,
    secret: &'a SecretString,
}

impl<'a> Credential<'a> {
    /// 키 원문. HTTP 요청을 만들 때만 사용합니다.
    pub fn expose(&self) -> &'a str {
        self.secret.expose_secret()
    }

    /// 로그/진단용 마스킹 표기. 앞 8자와 뒤 4자만 남깁니다.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.expose().chars().collect();
        if chars.len() <= 12 {
            let head: String = chars.iter().take(4.min(chars.len() / 2)).collect();
            return format!("{}***", head);
        }
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// API 키 순환기.
pub struct TokenRotator {
    tokens: Vec<SecretString>,
    cursor: AtomicUsize,
    policy: SelectionPolicy,
}

impl TokenRotator {
    /// 키 목록으로 생성. 빈 문자열은 제외됩니다.
    pub fn new<I, S>(tokens: I, policy: SelectionPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<SecretString> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .map(|t| SecretString::new(t.into_boxed_str()))
            .collect();

        Self {
            tokens,
            cursor: AtomicUsize::new(0),
            policy,
        }
    }

    /// 환경 변수 목록에서 키를 로드합니다. 설정되지 않은 변수는 건너뜁니다.
    pub fn from_env(vars: &[&str], policy: SelectionPolicy) -> Self {
        let rotator = Self::new(
            vars.iter().filter_map(|name| std::env::var(name).ok()),
            policy,
        );

        if rotator.is_empty() {
            warn!(vars = ?vars, "업스트림 API 키가 하나도 설정되지 않았습니다. 새로고침이 불가능합니다");
        } else {
            debug!(count = rotator.len(), "업스트림 API 키 로드");
        }

        rotator
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 위치로 키를 조회합니다. 진단처럼 모든 키를 차례로 써야 할 때 사용합니다.
    pub fn get(&self, index: usize) -> Option<Credential<'_>> {
        self.tokens.get(index).map(|secret| Credential { index, secret })
    }

    /// 현재 커서의 키.
    pub fn current(&self) -> Result<Credential<'_>> {
        if self.tokens.is_empty() {
            return Err(DataError::NoCredentialsAvailable);
        }
        let index = self.cursor.load(Ordering::Acquire) % self.tokens.len();
        Ok(Credential {
            index,
            secret: &self.tokens[index],
        })
    }

    /// 다음 키로 이동합니다.
    pub fn rotate(&self) {
        if self.tokens.is_empty() {
            return;
        }
        let index = self.cursor.load(Ordering::Acquire) % self.tokens.len();
        self.rotate_from(index);
    }

    /// 커서가 아직 `index`를 가리킬 때만 이동합니다.
    ///
    /// 같은 키로 동시에 실패한 요청들이 커서를 여러 번 넘기지 않도록 합니다.
    /// 실제로 이동했으면 `true`.
    pub fn rotate_from(&self, index: usize) -> bool {
        let len = self.tokens.len();
        if len == 0 {
            return false;
        }
        let next = self.next_index(index, len);
        let moved = self
            .cursor
            .compare_exchange(index, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if moved {
            debug!(from = index, to = next, "API 키 순환");
        }
        moved
    }

    fn next_index(&self, index: usize, len: usize) -> usize {
        match self.policy {
            SelectionPolicy::RoundRobin => (index + 1) % len,
            SelectionPolicy::Random if len > 1 => {
                let pick = rand::thread_rng().gen_range(0..len - 1);
                if pick >= index {
                    pick + 1
                } else {
                    pick
                }
            }
            SelectionPolicy::Random => index,
        }
    }
}

impl std::fmt::Debug for TokenRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRotator")
            .field("count", &self.tokens.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .field("policy", &self.policy)
            .finish()
    }
}
