//! SLMP end codes.
//!
//! The full enumeration documented for the command family this core speaks
//! (CCIEFB cyclic, SLMP node-search, SLMP set-IP), so an unexpected end code
//! can be logged or reported symbolically rather than as a bare hex number.
//! Only [`EndCode::Success`] and the four `Cciefb*` alarm codes are ever
//! acted on by the FSMs; the rest are diagnostic-only (§6.1).

/// A 16-bit SLMP end code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndCode(pub u16);

impl EndCode {
    pub const SUCCESS: EndCode = EndCode(0x0000);
    pub const COMMAND_ERROR: EndCode = EndCode(0xC059);
    pub const COMMAND_REQUEST_MSG: EndCode = EndCode(0xC05C);
    pub const REQUEST_DATA_LENGTH_MISMATCH: EndCode = EndCode(0xC61C);
    pub const CAN_WRONG_CONDITION: EndCode = EndCode(0xCCC7);
    pub const CAN_WRITE_ONLY: EndCode = EndCode(0xCCC8);
    pub const CAN_READ_ONLY: EndCode = EndCode(0xCCC9);
    pub const CAN_OBJECT_NOT_DEFINED: EndCode = EndCode(0xCCCA);
    pub const CAN_PDO_MAPPING_NOT_ALLOWED: EndCode = EndCode(0xCCCB);
    pub const CAN_PDO_DATA_LENGTH_MISMATCH: EndCode = EndCode(0xCCCC);
    pub const CAN_DATAVALUENUM_MISMATCH: EndCode = EndCode(0xCCD0);
    pub const CAN_DATAVALUENUM_TOO_LARGE: EndCode = EndCode(0xCCD1);
    pub const CAN_DATAVALUENUM_TOO_SMALL: EndCode = EndCode(0xCCD2);
    pub const CAN_SUBINDEX_DOES_NOT_EXIST: EndCode = EndCode(0xCCD3);
    pub const CAN_INVALID_PARAMETER: EndCode = EndCode(0xCCD4);
    pub const CAN_VALUE_TOO_LARGE: EndCode = EndCode(0xCCD5);
    pub const CAN_VALUE_TOO_SMALL: EndCode = EndCode(0xCCD6);
    pub const CAN_STORING_TRANSMITTING_IMPOSSIBLE: EndCode = EndCode(0xCCDA);
    pub const CAN_OTHER: EndCode = EndCode(0xCCFF);
    pub const REQUEST_BUSY: EndCode = EndCode(0xCEE0);
    pub const REQUEST_TOO_LARGE: EndCode = EndCode(0xCEE1);
    pub const RESPONSE_TOO_LARGE: EndCode = EndCode(0xCEE2);
    pub const GATEWAY_ERROR: EndCode = EndCode(0xCF00);
    pub const SERVER_INFO_DOES_NOT_EXIST: EndCode = EndCode(0xCF10);
    pub const CAN_NOT_BE_SET: EndCode = EndCode(0xCF20);
    pub const PARAMETER_DOES_NOT_EXIST: EndCode = EndCode(0xCF30);
    pub const PARAMETER_WRITING_WRONG_STATE: EndCode = EndCode(0xCF31);
    pub const DIVIDED_MESSAGE_TIMEOUT: EndCode = EndCode(0xCF40);
    pub const DIVIDED_MESSAGE_DUPLICATE: EndCode = EndCode(0xCF41);
    pub const DIVIDED_MESSAGE_DATA_ERROR: EndCode = EndCode(0xCF42);
    pub const DIVIDED_MESSAGE_LOST: EndCode = EndCode(0xCF43);
    pub const DIVIDED_MESSAGE_NOT_SUPPORTED: EndCode = EndCode(0xCF44);
    pub const COMMUNICATION_RELAY_ERROR: EndCode = EndCode(0xCF70);
    pub const COMMUNICATION_TIMEOUT: EndCode = EndCode(0xCF71);
    /// A master other than the one this slave is bound to sent a cyclic request.
    pub const CCIEFB_MASTER_DUPLICATION: EndCode = EndCode(0xCFE0);
    /// The request's slave-ID list implies a different occupied-station count
    /// than the slave is configured for.
    pub const CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS: EndCode = EndCode(0xCFE1);
    /// The slave application reports an internal error.
    pub const CCIEFB_SLAVE_ERROR: EndCode = EndCode(0xCFF0);
    /// The slave is gracefully disconnecting (see the `WaitDisablingSlave` state).
    pub const CCIEFB_SLAVE_REQUESTS_DISCONNECT: EndCode = EndCode(0xCFFF);

    /// Whether this end code is one of the five legal on a CCIEFB cyclic response.
    pub fn is_valid_cyclic_response(self) -> bool {
        matches!(
            self,
            EndCode::SUCCESS
                | EndCode::CCIEFB_MASTER_DUPLICATION
                | EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS
                | EndCode::CCIEFB_SLAVE_ERROR
                | EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT
        )
    }

    /// A human-readable name for known end codes, for logging.
    pub fn name(self) -> &'static str {
        match self {
            EndCode::SUCCESS => "Success",
            EndCode::COMMAND_ERROR => "CommandError",
            EndCode::COMMAND_REQUEST_MSG => "CommandRequestMsg",
            EndCode::REQUEST_DATA_LENGTH_MISMATCH => "RequestDataLengthMismatch",
            EndCode::CAN_WRONG_CONDITION => "CanWrongCondition",
            EndCode::CAN_WRITE_ONLY => "CanWriteOnly",
            EndCode::CAN_READ_ONLY => "CanReadOnly",
            EndCode::CAN_OBJECT_NOT_DEFINED => "CanObjectNotDefined",
            EndCode::CAN_PDO_MAPPING_NOT_ALLOWED => "CanPdoMappingNotAllowed",
            EndCode::CAN_PDO_DATA_LENGTH_MISMATCH => "CanPdoDataLengthMismatch",
            EndCode::CAN_DATAVALUENUM_MISMATCH => "CanDataValueNumMismatch",
            EndCode::CAN_DATAVALUENUM_TOO_LARGE => "CanDataValueNumTooLarge",
            EndCode::CAN_DATAVALUENUM_TOO_SMALL => "CanDataValueNumTooSmall",
            EndCode::CAN_SUBINDEX_DOES_NOT_EXIST => "CanSubindexDoesNotExist",
            EndCode::CAN_INVALID_PARAMETER => "CanInvalidParameter",
            EndCode::CAN_VALUE_TOO_LARGE => "CanValueTooLarge",
            EndCode::CAN_VALUE_TOO_SMALL => "CanValueTooSmall",
            EndCode::CAN_STORING_TRANSMITTING_IMPOSSIBLE => "CanStoringTransmittingImpossible",
            EndCode::CAN_OTHER => "CanOther",
            EndCode::REQUEST_BUSY => "RequestBusy",
            EndCode::REQUEST_TOO_LARGE => "RequestTooLarge",
            EndCode::RESPONSE_TOO_LARGE => "ResponseTooLarge",
            EndCode::GATEWAY_ERROR => "GatewayError",
            EndCode::SERVER_INFO_DOES_NOT_EXIST => "ServerInfoDoesNotExist",
            EndCode::CAN_NOT_BE_SET => "CanNotBeSet",
            EndCode::PARAMETER_DOES_NOT_EXIST => "ParameterDoesNotExist",
            EndCode::PARAMETER_WRITING_WRONG_STATE => "ParameterWritingWrongState",
            EndCode::DIVIDED_MESSAGE_TIMEOUT => "DividedMessageTimeout",
            EndCode::DIVIDED_MESSAGE_DUPLICATE => "DividedMessageDuplicate",
            EndCode::DIVIDED_MESSAGE_DATA_ERROR => "DividedMessageDataError",
            EndCode::DIVIDED_MESSAGE_LOST => "DividedMessageLost",
            EndCode::DIVIDED_MESSAGE_NOT_SUPPORTED => "DividedMessageNotSupported",
            EndCode::COMMUNICATION_RELAY_ERROR => "CommunicationRelayError",
            EndCode::COMMUNICATION_TIMEOUT => "CommunicationTimeout",
            EndCode::CCIEFB_MASTER_DUPLICATION => "CciefbMasterDuplication",
            EndCode::CCIEFB_WRONG_NUMBER_OCCUPIED_STATIONS => "CciefbWrongNumberOccupiedStations",
            EndCode::CCIEFB_SLAVE_ERROR => "CciefbSlaveError",
            EndCode::CCIEFB_SLAVE_REQUESTS_DISCONNECT => "CciefbSlaveRequestsDisconnect",
            _ => "Unknown",
        }
    }
}

impl From<u16> for EndCode {
    fn from(value: u16) -> Self {
        EndCode(value)
    }
}

impl From<EndCode> for u16 {
    fn from(value: EndCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for EndCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (0x{:04X})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_five_cyclic_codes_valid() {
        let valid: Vec<u16> = (0u32..=0xFFFF)
            .map(|v| v as u16)
            .filter(|&v| EndCode(v).is_valid_cyclic_response())
            .collect();
        assert_eq!(
            valid,
            vec![0x0000, 0xCFE0, 0xCFE1, 0xCFF0, 0xCFFF]
        );
    }

    #[test]
    fn unknown_code_has_fallback_name() {
        assert_eq!(EndCode(0x1234).name(), "Unknown");
    }
}
