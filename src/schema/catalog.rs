//! Static command catalog.
//!
//! A representative slice of the firmware command set; the full table is
//! generated per hardware backend and swapped in as data, the engine only
//! depends on the [`ParameterType`] vocabulary.

use super::{CommandDescriptor, CommandKind, Parameter, ParameterType, Subsystem};

use CommandKind::{Areq, Sreq};
use ParameterType::*;

const fn p(name: &'static str, ty: ParameterType) -> Parameter {
    Parameter { name, ty }
}

const fn sreq(
    name: &'static str,
    id: u8,
    request: &'static [Parameter],
    response: &'static [Parameter],
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        id,
        kind: Sreq,
        request,
        response: Some(response),
        timeout_ms: None,
    }
}

const fn areq(name: &'static str, id: u8, request: &'static [Parameter]) -> CommandDescriptor {
    CommandDescriptor {
        name,
        id,
        kind: Areq,
        request,
        response: None,
        timeout_ms: None,
    }
}

static SYS: &[CommandDescriptor] = &[
    areq("resetReq", 0, &[p("type", Uint8)]),
    sreq("ping", 1, &[], &[p("capabilities", Uint16)]),
    sreq(
        "version",
        2,
        &[],
        &[
            p("transportrev", Uint8),
            p("product", Uint8),
            p("majorrel", Uint8),
            p("minorrel", Uint8),
            p("maintrel", Uint8),
            p("revision", Uint32),
        ],
    ),
    sreq(
        "osalNvRead",
        8,
        &[p("id", Uint16), p("offset", Uint8)],
        &[p("status", Uint8), p("len", Uint8), p("value", Buffer)],
    ),
    sreq(
        "osalNvWrite",
        9,
        &[
            p("id", Uint16),
            p("offset", Uint8),
            p("len", Uint8),
            p("value", Buffer),
        ],
        &[p("status", Uint8)],
    ),
    areq(
        "resetInd",
        128,
        &[
            p("reason", Uint8),
            p("transportrev", Uint8),
            p("productid", Uint8),
            p("majorrel", Uint8),
            p("minorrel", Uint8),
            p("hwrev", Uint8),
        ],
    ),
];

static UTIL: &[CommandDescriptor] = &[
    sreq(
        "getDeviceInfo",
        0,
        &[],
        &[
            p("status", Uint8),
            p("ieeeaddr", IeeeAddr),
            p("shortaddr", Uint16),
            p("devicetype", Uint8),
            p("devicestate", Uint8),
            p("numassocdevices", Uint8),
            p("assocdeviceslist", ListU16),
        ],
    ),
    sreq(
        "ledControl",
        10,
        &[p("ledid", Uint8), p("mode", Uint8)],
        &[p("status", Uint8)],
    ),
    sreq(
        "assocGetWithAddress",
        74,
        &[p("extaddr", IeeeAddr), p("nwkaddr", Uint16)],
        &[
            p("nwkaddr", Uint16),
            p("addridx", Uint16),
            p("noderelation", Uint8),
        ],
    ),
    sreq(
        "assocRemove",
        99,
        &[p("ieeeadr", IeeeAddr)],
        &[p("status", Uint8)],
    ),
    sreq(
        "assocAdd",
        100,
        &[
            p("ieeeadr", IeeeAddr),
            p("nwkaddr", Uint16),
            p("noderelation", Uint8),
        ],
        &[p("status", Uint8)],
    ),
];

static ZDO: &[CommandDescriptor] = &[
    sreq(
        "nwkAddrReq",
        0,
        &[
            p("ieeeaddr", IeeeAddr),
            p("reqtype", Uint8),
            p("startindex", Uint8),
        ],
        &[p("status", Uint8)],
    ),
    CommandDescriptor {
        name: "startupFromApp",
        id: 64,
        kind: Sreq,
        request: &[p("startdelay", Uint16)],
        response: Some(&[p("status", Uint8)]),
        timeout_ms: Some(40_000),
    },
    sreq(
        "extRouteDisc",
        69,
        &[p("dstAddr", Uint16), p("options", Uint8), p("radius", Uint8)],
        &[p("status", Uint8)],
    ),
    areq(
        "nwkAddrRsp",
        128,
        &[
            p("status", Uint8),
            p("ieeeaddr", IeeeAddr),
            p("nwkaddr", Uint16),
            p("startindex", Uint8),
            p("numassocdev", Uint8),
            p("assocdevlist", ListAssocDev),
        ],
    ),
    areq(
        "mgmtNwkDiscRsp",
        176,
        &[
            p("srcaddr", Uint16),
            p("status", Uint8),
            p("networkcount", Uint8),
            p("startindex", Uint8),
            p("networklistcount", Uint8),
            p("networklist", ListNetwork),
        ],
    ),
    areq(
        "mgmtRtgRsp",
        178,
        &[
            p("srcaddr", Uint16),
            p("status", Uint8),
            p("routingtableentries", Uint8),
            p("startindex", Uint8),
            p("routingtablelistcount", Uint8),
            p("routingtablelist", ListRouting),
        ],
    ),
];

static AF: &[CommandDescriptor] = &[
    sreq(
        "register",
        0,
        &[
            p("endpoint", Uint8),
            p("appprofid", Uint16),
            p("appdeviceid", Uint16),
            p("appdevver", Uint8),
            p("latencyreq", Uint8),
            p("appnuminclusters", Uint8),
            p("appinclusterlist", ListU16),
            p("appnumoutclusters", Uint8),
            p("appoutclusterlist", ListU16),
        ],
        &[p("status", Uint8)],
    ),
    sreq(
        "dataRequest",
        1,
        &[
            p("dstaddr", Uint16),
            p("destendpoint", Uint8),
            p("srcendpoint", Uint8),
            p("clusterid", Uint16),
            p("transid", Uint8),
            p("options", Uint8),
            p("radius", Uint8),
            p("len", Uint8),
            p("data", Buffer),
        ],
        &[p("status", Uint8)],
    ),
    areq(
        "dataConfirm",
        128,
        &[p("status", Uint8), p("endpoint", Uint8), p("transid", Uint8)],
    ),
    areq(
        "incomingMsg",
        129,
        &[
            p("groupid", Uint16),
            p("clusterid", Uint16),
            p("srcaddr", Uint16),
            p("srcendpoint", Uint8),
            p("dstendpoint", Uint8),
            p("wasbroadcast", Uint8),
            p("linkquality", Uint8),
            p("securityuse", Uint8),
            p("timestamp", Uint32),
            p("transseqnumber", Uint8),
            p("len", Uint8),
            p("data", Buffer),
        ],
    ),
];

static APP_CNF: &[CommandDescriptor] = &[CommandDescriptor {
    name: "bdbStartCommissioning",
    id: 5,
    kind: Sreq,
    request: &[p("mode", Uint8)],
    response: Some(&[p("status", Uint8)]),
    timeout_ms: Some(40_000),
}];

pub(super) fn commands(subsystem: Subsystem) -> &'static [CommandDescriptor] {
    match subsystem {
        Subsystem::Sys => SYS,
        Subsystem::Util => UTIL,
        Subsystem::Zdo => ZDO,
        Subsystem::Af => AF,
        Subsystem::AppCnf => APP_CNF,
        _ => &[],
    }
}
