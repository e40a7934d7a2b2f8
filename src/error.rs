use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error("ストレージエラー")]
    Storage(#[from] sqlx::Error),

    #[error("ハッシュ処理エラー: {0}")]
    Hashing(String),
}

/// トークン検証の失敗理由
///
/// エラーではなく検証結果として返される。
/// 真偽値だけが必要な呼び出し側ではすべて「無効」として扱ってよい。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// モデル参照に対応するトークンが存在しない
    NotFound,
    /// 使用回数の上限に達している
    Exhausted,
    /// 有効期限切れ
    Expired,
    /// シークレットがハッシュと一致しない
    BadSecret,
}

impl InvalidReason {
    /// 構造化ログ用の固定コード
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Exhausted => "exhausted",
            Self::Expired => "expired",
            Self::BadSecret => "bad_secret",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::NotFound => "トークンが見つかりません",
            Self::Exhausted => "使用回数の上限に達しています",
            Self::Expired => "トークンの有効期限が切れています",
            Self::BadSecret => "トークンが一致しません",
        };
        f.write_str(message)
    }
}
