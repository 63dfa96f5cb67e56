//! PROJ形式の投影法定義文字列の解析
use crate::readers::parse_f64;
use crate::{MeicError, MeicResult};

/// ランベルト正角円錐図法の投影パラメーター
///
/// I/O APIの格子ファイルでは、次の属性に対応する。
///
/// * `P_ALP` - 第1標準緯線(`lat_1`)
/// * `P_BET` - 第2標準緯線(`lat_2`)
/// * `P_GAM` - 中央経線(`lon_0`)
/// * `XCENT` - 中央経線(`lon_0`)
/// * `YCENT` - 原点の緯度(`lat_0`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertConformal {
    /// 第1標準緯線（度）
    pub standard_parallel_1: f64,
    /// 第2標準緯線（度）
    pub standard_parallel_2: f64,
    /// 中央経線（度）
    pub central_meridian: f64,
    /// 原点の緯度（度）
    pub latitude_of_origin: f64,
}

impl LambertConformal {
    /// PROJ形式の投影法定義文字列を解析する。
    ///
    /// `+proj=lcc`以外の投影法はサポートしない。
    /// `lat_1`、`lon_0`、`lat_0`は必須で、`lat_2`が省略された場合は`lat_1`を採用する。
    /// 認識しないパラメーターは無視する。
    ///
    /// # 引数
    ///
    /// * `definition` - 投影法定義文字列（例: `+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110 +lat_0=34`）
    pub fn from_proj_str(definition: &str) -> MeicResult<Self> {
        let mut proj = None;
        let mut lat_1 = None;
        let mut lat_2 = None;
        let mut lon_0 = None;
        let mut lat_0 = None;

        for token in definition.split_whitespace() {
            let token = token.trim_start_matches('+');
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key, value),
                // `+no_defs`のような値を持たないフラグ
                None => continue,
            };
            let number = |v: &str| {
                parse_f64(v, key).map_err(|e| MeicError::Projection(format!("{e}")))
            };
            match key {
                "proj" => proj = Some(value),
                "lat_1" => lat_1 = Some(number(value)?),
                "lat_2" => lat_2 = Some(number(value)?),
                "lon_0" => lon_0 = Some(number(value)?),
                "lat_0" => lat_0 = Some(number(value)?),
                _ => {}
            }
        }

        match proj {
            Some("lcc") => {}
            Some(other) => {
                return Err(MeicError::Projection(format!(
                    "サポートしていない投影法です。`{other}`"
                )))
            }
            None => {
                return Err(MeicError::Projection(format!(
                    "`+proj`が指定されていません。`{definition}`"
                )))
            }
        }
        let lat_1 = lat_1.ok_or_else(|| {
            MeicError::Projection(format!("`+lat_1`が指定されていません。`{definition}`"))
        })?;
        let lon_0 = lon_0.ok_or_else(|| {
            MeicError::Projection(format!("`+lon_0`が指定されていません。`{definition}`"))
        })?;
        let lat_0 = lat_0.ok_or_else(|| {
            MeicError::Projection(format!("`+lat_0`が指定されていません。`{definition}`"))
        })?;

        Ok(Self {
            standard_parallel_1: lat_1,
            standard_parallel_2: lat_2.unwrap_or(lat_1),
            central_meridian: lon_0,
            latitude_of_origin: lat_0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lambert_parameters_by_name() {
        let proj = LambertConformal::from_proj_str(
            "+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110 +lat_0=34 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs",
        )
        .unwrap();
        assert_eq!(proj.standard_parallel_1, 25.0);
        assert_eq!(proj.standard_parallel_2, 40.0);
        assert_eq!(proj.central_meridian, 110.0);
        assert_eq!(proj.latitude_of_origin, 34.0);
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a =
            LambertConformal::from_proj_str("+lat_0=34 +lon_0=110 +lat_2=40 +lat_1=25 +proj=lcc")
                .unwrap();
        let b =
            LambertConformal::from_proj_str("+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110 +lat_0=34")
                .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_second_parallel_defaults_to_first() {
        let proj =
            LambertConformal::from_proj_str("+proj=lcc +lat_1=30 +lon_0=120 +lat_0=35").unwrap();
        assert_eq!(proj.standard_parallel_2, 30.0);
        assert_eq!(proj.latitude_of_origin, 35.0);
    }

    #[test]
    fn missing_latitude_of_origin_is_error() {
        assert!(matches!(
            LambertConformal::from_proj_str("+proj=lcc +lat_1=25 +lat_2=40 +lon_0=110"),
            Err(MeicError::Projection(_))
        ));
        assert!(matches!(
            LambertConformal::from_proj_str("+proj=lcc +lat_1=25 +lon_0=110"),
            Err(MeicError::Projection(_))
        ));
    }

    #[test]
    fn rejects_other_projections_and_bad_numbers() {
        assert!(matches!(
            LambertConformal::from_proj_str("+proj=merc +lat_1=30 +lon_0=120"),
            Err(MeicError::Projection(_))
        ));
        assert!(matches!(
            LambertConformal::from_proj_str("+proj=lcc +lat_1=abc +lon_0=120"),
            Err(MeicError::Projection(_))
        ));
        assert!(matches!(
            LambertConformal::from_proj_str("+proj=lcc +lat_1=30"),
            Err(MeicError::Projection(_))
        ));
        assert!(LambertConformal::from_proj_str("").is_err());
    }
}
