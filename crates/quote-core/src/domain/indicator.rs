//! 경제 지표 표시 단위.
//!
//! FRED 시리즈마다 값의 단위가 다르므로 대시보드에는 단위가 붙은 문자열을 함께 내려줍니다.
//! 값은 소수 둘째 자리에서 버림하고 천 단위 구분 기호를 붙입니다.

/// 시리즈별 표시 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorUnit {
    /// 십억 (`B`)
    Billions,
    /// 백만 (`M`)
    Millions,
    /// 퍼센트
    Percent,
    /// 천 호
    ThousandsOfUnits,
    /// 시간당 달러
    DollarsPerHour,
    /// 지수 (기준 시점 표기)
    Index(&'static str),
    /// 단위 없음
    Plain,
}

impl IndicatorUnit {
    /// 시리즈 ID의 단위.
    pub fn for_series(series_id: &str) -> Self {
        match series_id {
            "GDP" | "A191RL1Q225SBEA" | "M2SL" => IndicatorUnit::Billions,
            "RSAFS" => IndicatorUnit::Millions,
            "HOUST" => IndicatorUnit::ThousandsOfUnits,
            "CES0500000003" => IndicatorUnit::DollarsPerHour,
            "DFF" | "UNRATE" | "DGS10" | "BAA10YM" => IndicatorUnit::Percent,
            "CPIAUCSL" => IndicatorUnit::Index("1982-1984=100"),
            "INDPRO" => IndicatorUnit::Index("2017=100"),
            _ => IndicatorUnit::Plain,
        }
    }

    /// 단위를 붙인 표시 문자열.
    pub fn format(&self, value: f64) -> String {
        let number = format_truncated(value);
        match self {
            IndicatorUnit::Billions => format!("{}B", number),
            IndicatorUnit::Millions => format!("{}M", number),
            IndicatorUnit::Percent => format!("{}%", number),
            IndicatorUnit::ThousandsOfUnits => format!("{} Thousands of Units", number),
            IndicatorUnit::DollarsPerHour => format!("{} Dollars per Hour", number),
            IndicatorUnit::Index(base) => format!("{} ({})", number, base),
            IndicatorUnit::Plain => number,
        }
    }
}

/// 소수 둘째 자리 버림, 천 단위 구분, 끝자리 0 제거.
fn format_truncated(value: f64) -> String {
    let cents = (value * 100.0).trunc() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = group_thousands(cents / 100);

    match cents % 100 {
        0 => format!("{}{}", sign, whole),
        frac if frac % 10 == 0 => format!("{}{}.{}", sign, whole, frac / 10),
        frac => format!("{}{}.{:02}", sign, whole, frac),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_units() {
        assert_eq!(IndicatorUnit::for_series("GDP").format(29_962.0), "29,962B");
        assert_eq!(IndicatorUnit::for_series("RSAFS").format(724_131.0), "724,131M");
        assert_eq!(IndicatorUnit::for_series("UNRATE").format(4.25), "4.25%");
        assert_eq!(
            IndicatorUnit::for_series("CPIAUCSL").format(320.5),
            "320.5 (1982-1984=100)"
        );
        assert_eq!(
            IndicatorUnit::for_series("HOUST").format(1_361.0),
            "1,361 Thousands of Units"
        );
        assert_eq!(
            IndicatorUnit::for_series("CES0500000003").format(36.5),
            "36.5 Dollars per Hour"
        );
        assert_eq!(IndicatorUnit::for_series("UNKNOWN"), IndicatorUnit::Plain);
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        assert_eq!(format_truncated(1_234.5678), "1,234.56");
        assert_eq!(format_truncated(0.999), "0.99");
        assert_eq!(format_truncated(-0.5), "-0.5");
        assert_eq!(format_truncated(1_000_000.0), "1,000,000");
    }
}
