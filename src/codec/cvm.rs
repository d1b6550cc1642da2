//! EMV Cardholder Verification Method list parse/evaluate (spec.md §4.1, §8).

/// CVM method decoded from bits 0-5 of the CVM byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvmMethod {
    Fail,
    PlaintextPinIcc,
    EncipheredPinOnline,
    PlaintextPinIccAndSignature,
    EncipheredPinIcc,
    EncipheredPinIccAndSignature,
    Signature,
    NoCvm,
    Unknown(u8),
}

impl CvmMethod {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => CvmMethod::Fail,
            0x01 => CvmMethod::PlaintextPinIcc,
            0x02 => CvmMethod::EncipheredPinOnline,
            0x03 => CvmMethod::PlaintextPinIccAndSignature,
            0x04 => CvmMethod::EncipheredPinIcc,
            0x05 => CvmMethod::EncipheredPinIccAndSignature,
            0x1E => CvmMethod::Signature,
            0x1F => CvmMethod::NoCvm,
            other => CvmMethod::Unknown(other),
        }
    }
}

/// Condition byte for a CVM rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvmCondition {
    Always,
    AmountUnderX,
    AmountOverX,
    AmountUnderY,
    AmountOverY,
    TerminalSupportsCvm,
    Unknown(u8),
}

impl CvmCondition {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => CvmCondition::Always,
            0x03 => CvmCondition::TerminalSupportsCvm,
            0x06 => CvmCondition::AmountUnderX,
            0x07 => CvmCondition::AmountOverX,
            0x08 => CvmCondition::AmountUnderY,
            0x09 => CvmCondition::AmountOverY,
            other => CvmCondition::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CvmRule {
    pub method: CvmMethod,
    pub condition: CvmCondition,
    /// Bit 6 of the CVM byte: continue to the next rule on failure.
    pub continue_if_unsuccessful: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvmList {
    pub amount_x: u32,
    pub amount_y: u32,
    pub rules: Vec<CvmRule>,
}

/// Parses a CVM List: 8 bytes of amountX/amountY followed by
/// `cvmByte conditionByte` pairs (spec.md §4.1).
pub fn parse_cvm_list(data: &[u8]) -> Option<CvmList> {
    if data.len() < 8 {
        return None;
    }
    let amount_x = u32::from_be_bytes(data[0..4].try_into().ok()?);
    let amount_y = u32::from_be_bytes(data[4..8].try_into().ok()?);

    let mut rules = Vec::new();
    let mut offset = 8;
    while offset + 1 < data.len() {
        let cvm_byte = data[offset];
        let condition_byte = data[offset + 1];
        rules.push(CvmRule {
            method: CvmMethod::from_code(cvm_byte & 0x3F),
            condition: CvmCondition::from_code(condition_byte),
            continue_if_unsuccessful: cvm_byte & 0x40 != 0,
        });
        offset += 2;
    }

    Some(CvmList { amount_x, amount_y, rules })
}

/// Walks the rule list in order, returning the first rule whose condition
/// matches the given transaction amount (spec.md §4.1, §8).
pub fn evaluate_cvm(list: &CvmList, amount: u32) -> Option<CvmRule> {
    list.rules.iter().copied().find(|rule| match rule.condition {
        CvmCondition::Always => true,
        CvmCondition::AmountUnderX => amount < list.amount_x,
        CvmCondition::AmountOverX => amount > list.amount_x,
        CvmCondition::AmountUnderY => amount < list.amount_y,
        CvmCondition::AmountOverY => amount > list.amount_y,
        CvmCondition::TerminalSupportsCvm => true,
        CvmCondition::Unknown(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> CvmList {
        // 00 00 00 64 (X=100) 00 00 00 00 (Y=0) 1F 06 (no_cvm, amount_under_x) 01 00 (plaintext_pin_icc, always)
        parse_cvm_list(&[0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x1F, 0x06, 0x01, 0x00])
            .unwrap()
    }

    #[test]
    fn amount_under_x_selects_no_cvm() {
        let list = sample_list();
        let rule = evaluate_cvm(&list, 50).unwrap();
        assert_eq!(rule.method, CvmMethod::NoCvm);
    }

    #[test]
    fn amount_over_x_falls_through_to_always_rule() {
        let list = sample_list();
        let rule = evaluate_cvm(&list, 150).unwrap();
        assert_eq!(rule.method, CvmMethod::PlaintextPinIcc);
    }

    #[test]
    fn unmatched_list_returns_none() {
        let list = CvmList {
            amount_x: 0,
            amount_y: 0,
            rules: vec![CvmRule {
                method: CvmMethod::NoCvm,
                condition: CvmCondition::Unknown(0x7F),
                continue_if_unsuccessful: false,
            }],
        };
        assert!(evaluate_cvm(&list, 10).is_none());
    }
}
