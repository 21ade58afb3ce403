use crate::protocol::codec::{var_data_length, FrameReader, FrameWriter};
use crate::protocol::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PORT_NULL: u16 = u16::MAX;
pub const NODE_ID_NULL: i32 = i32::MIN;
const MEMBER_TYPE_NULL: u8 = u8::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberType {
    Active,
    Passive,
    Inactive,
}

impl MemberType {
    fn code(&self) -> u8 {
        match self {
            MemberType::Active => 0,
            MemberType::Passive => 1,
            MemberType::Inactive => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            // An absent member type on a present member reads as the common case.
            0 | MEMBER_TYPE_NULL => Ok(MemberType::Active),
            1 => Ok(MemberType::Passive),
            2 => Ok(MemberType::Inactive),
            value => Err(CodecError::InvalidEnumValue {
                field: "member.type",
                value,
            }),
        }
    }
}

/// Member is a cluster participant, identified by its endpoint.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub host: String,
    pub port: u16,
    pub node_id: i32,
    pub member_type: MemberType,
}

impl Member {
    pub fn new(host: impl Into<String>, port: u16, node_id: i32) -> Self {
        Member {
            host: host.into(),
            port,
            node_id,
            member_type: MemberType::Active,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.host, self.port, self.node_id)
    }
}

/// Fixed block portion of a member: port, node id and type. The host travels as var data after
/// the fixed block, so an absent member is just a null port and an empty host.
pub(crate) const MEMBER_FIXED_LENGTH: u16 = 2 + 4 + 1;

pub(crate) fn write_member_fixed(writer: &mut FrameWriter<'_>, member: Option<&Member>) {
    match member {
        Some(member) => {
            writer.put_u16(member.port);
            writer.put_i32(member.node_id);
            writer.put_u8(member.member_type.code());
        }
        None => {
            writer.put_u16(PORT_NULL);
            writer.put_i32(NODE_ID_NULL);
            writer.put_u8(MEMBER_TYPE_NULL);
        }
    }
}

/// Half-decoded member: fixed fields are known, host comes later.
pub(crate) struct MemberFixed {
    port: u16,
    node_id: i32,
    member_type: u8,
}

pub(crate) fn read_member_fixed(reader: &mut FrameReader<'_>) -> Result<MemberFixed, CodecError> {
    Ok(MemberFixed {
        port: reader.u16("member.port")?,
        node_id: reader.i32("member.node_id")?,
        member_type: reader.u8("member.type")?,
    })
}

impl MemberFixed {
    pub(crate) fn with_host(self, host: String) -> Result<Option<Member>, CodecError> {
        if self.port == PORT_NULL {
            return Ok(None);
        }

        Ok(Some(Member {
            host,
            port: self.port,
            node_id: self.node_id,
            member_type: MemberType::from_code(self.member_type)?,
        }))
    }
}

pub(crate) fn host_bytes(member: Option<&Member>) -> &[u8] {
    member.map(|m| m.host.as_bytes()).unwrap_or_default()
}

/// Also rejects a present member on the null port, which would decode as no member at all.
pub(crate) fn host_length(member: Option<&Member>) -> Result<usize, CodecError> {
    if let Some(member) = member {
        check_port("member.port", member)?;
    }
    var_data_length("member.host", host_bytes(member))
}

fn check_port(field: &'static str, member: &Member) -> Result<(), CodecError> {
    if member.port == PORT_NULL {
        return Err(CodecError::ReservedValue {
            field,
            value: PORT_NULL as i64,
        });
    }
    Ok(())
}

/// Repeating group of members: group header, then per member the fixed fields followed by its
/// host.
pub(crate) fn members_group_length(members: &[Member]) -> Result<usize, CodecError> {
    if members.len() > u16::MAX as usize {
        return Err(CodecError::FieldTooLong {
            field: "members",
            length: members.len(),
            max: u16::MAX as usize,
        });
    }

    let mut length = super::codec::GROUP_HEADER_LENGTH;
    for member in members {
        check_port("members.port", member)?;
        length += MEMBER_FIXED_LENGTH as usize + var_data_length("members.host", member.host.as_bytes())?;
    }
    Ok(length)
}

pub(crate) fn write_members_group(writer: &mut FrameWriter<'_>, members: &[Member]) {
    writer.put_group_header(MEMBER_FIXED_LENGTH, members.len() as u16);
    for member in members {
        write_member_fixed(writer, Some(member));
        writer.put_var_data(member.host.as_bytes());
    }
}

pub(crate) fn read_members_group(reader: &mut FrameReader<'_>, members: &mut Vec<Member>) -> Result<(), CodecError> {
    let (block_length, count) = reader.group_header("members")?;
    if block_length < MEMBER_FIXED_LENGTH {
        return Err(CodecError::BlockTooShort {
            minimum: MEMBER_FIXED_LENGTH,
            actual: block_length,
        });
    }

    members.clear();
    members.reserve(count as usize);
    for _ in 0..count {
        let mut block = reader.block("members.entry", block_length as usize)?;
        let fixed = read_member_fixed(&mut block)?;
        let host = reader.var_string("members.host")?;
        match fixed.with_host(host)? {
            Some(member) => members.push(member),
            None => {
                return Err(CodecError::ReservedValue {
                    field: "members.port",
                    value: PORT_NULL as i64,
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::append::AppendRequest;
    use crate::protocol::membership::ConfigureRequest;
    use crate::protocol::message::RaftMessage;

    #[test]
    fn member_on_null_port_is_not_encoded() {
        let request = AppendRequest {
            term: 3,
            leader: Some(Member::new("broker-1", PORT_NULL, 7)),
            ..AppendRequest::default()
        };

        assert_eq!(
            request.encode(),
            Err(CodecError::ReservedValue {
                field: "member.port",
                value: 65535
            })
        );
    }

    #[test]
    fn members_group_keeps_every_member() {
        let mut request = ConfigureRequest {
            term: 2,
            members: vec![Member::new("a", 65534, 1), Member::new("b", 1, 2)],
            ..ConfigureRequest::default()
        };
        let decoded = ConfigureRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);

        // A null port in the group would otherwise drop the member on decode.
        request.members.insert(0, Member::new("c", PORT_NULL, 3));
        assert_eq!(
            request.encode(),
            Err(CodecError::ReservedValue {
                field: "members.port",
                value: 65535
            })
        );
    }
}
