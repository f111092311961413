use crate::ProtoError;

/// Action codes carried in the request header, one per database lookup or
/// PAM hook the daemon serves over the client socket. Numbering is this
/// rendition's own; nothing outside this crate and its NSS/PAM-side
/// counterpart needs to agree with any other numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    ConfigGet = 1,

    PasswdByName = 10,
    PasswdByUid = 11,
    PasswdAll = 12,

    ShadowByName = 20,
    ShadowAll = 21,

    GroupByName = 30,
    GroupByGid = 31,
    GroupByMember = 32,
    GroupAll = 33,

    HostByName = 40,
    HostByAddr = 41,
    HostAll = 42,

    NetworkByName = 50,
    NetworkByAddr = 51,
    NetworkAll = 52,

    ProtocolByName = 60,
    ProtocolByNumber = 61,
    ProtocolAll = 62,

    RpcByName = 70,
    RpcByNumber = 71,
    RpcAll = 72,

    ServiceByName = 80,
    ServiceByNumber = 81,
    ServiceAll = 82,

    NetgroupByName = 90,

    AliasByName = 100,
    AliasAll = 101,

    EtherByName = 110,
    EtherByEther = 111,
    EtherAll = 112,

    InitGroups = 120,

    Authenticate = 130,
    Authorize = 131,
    SessionOpen = 132,
    SessionClose = 133,
    PasswordChange = 134,
    UserModify = 135,
}

impl Opcode {
    pub const ALL: &'static [Opcode] = &[
        Opcode::ConfigGet,
        Opcode::PasswdByName,
        Opcode::PasswdByUid,
        Opcode::PasswdAll,
        Opcode::ShadowByName,
        Opcode::ShadowAll,
        Opcode::GroupByName,
        Opcode::GroupByGid,
        Opcode::GroupByMember,
        Opcode::GroupAll,
        Opcode::HostByName,
        Opcode::HostByAddr,
        Opcode::HostAll,
        Opcode::NetworkByName,
        Opcode::NetworkByAddr,
        Opcode::NetworkAll,
        Opcode::ProtocolByName,
        Opcode::ProtocolByNumber,
        Opcode::ProtocolAll,
        Opcode::RpcByName,
        Opcode::RpcByNumber,
        Opcode::RpcAll,
        Opcode::ServiceByName,
        Opcode::ServiceByNumber,
        Opcode::ServiceAll,
        Opcode::NetgroupByName,
        Opcode::AliasByName,
        Opcode::AliasAll,
        Opcode::EtherByName,
        Opcode::EtherByEther,
        Opcode::EtherAll,
        Opcode::InitGroups,
        Opcode::Authenticate,
        Opcode::Authorize,
        Opcode::SessionOpen,
        Opcode::SessionClose,
        Opcode::PasswordChange,
        Opcode::UserModify,
    ];
}

impl TryFrom<i32> for Opcode {
    type Error = ProtoError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| *op as i32 == value)
            .ok_or(ProtoError::UnknownOpcode(value))
    }
}

impl From<Opcode> for i32 {
    fn from(op: Opcode) -> i32 {
        op as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_wire_value() {
        for op in Opcode::ALL {
            let wire: i32 = (*op).into();
            assert_eq!(Opcode::try_from(wire).unwrap(), *op);
        }
    }

    #[test]
    fn unknown_wire_value_is_rejected() {
        assert!(matches!(Opcode::try_from(-1), Err(ProtoError::UnknownOpcode(-1))));
    }
}
