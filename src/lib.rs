// chainmesh - proof-of-work ledger with peer-to-peer gossip
//
// Layers, leaf first:
// - chain:     blocks, proof-of-work and the longest-valid-chain rule
// - sync:      wire protocol, gossip state machine, open peer set
// - transport: listener/dialer abstractions and the TCP session loop
// - storage:   optional on-disk chain persistence
// - node:      configuration, cancellable miner, runtime wiring

pub mod chain;
pub mod node;
pub mod storage;
pub mod sync;
pub mod transport;
