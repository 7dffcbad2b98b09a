//! Process, thread and package bookkeeping

use crate::storage::TraceStorage;
use std::collections::HashMap;
use tracery_shared::types::events::{PackageInfo, Pid, Tid, Uid};
use tracery_shared::types::ids::{StringId, UniquePid, UniqueTid};
use tracery_shared::types::profile::{PackageRow, ProcessRow, ThreadRow};

/// Maps pids and tids to their unique ids for the session
#[derive(Debug, Default)]
pub struct ProcessTracker {
    pids: HashMap<Pid, UniquePid>,
    tids: HashMap<Tid, UniqueTid>,
    packages_by_uid: HashMap<Uid, Vec<StringId>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_process(&mut self, storage: &mut TraceStorage, pid: Pid) -> UniquePid {
        *self.pids.entry(pid).or_insert_with(|| {
            storage.processes.insert(ProcessRow {
                pid,
                name: None,
                uid: None,
                android_appid: None,
            })
        })
    }

    /// Thread `tid`, attached to process `pid` when known
    pub fn update_thread(&mut self, storage: &mut TraceStorage, tid: Tid, pid: Option<Pid>) -> UniqueTid {
        let upid = pid.map(|pid| self.get_or_create_process(storage, pid));
        let utid = *self
            .tids
            .entry(tid)
            .or_insert_with(|| storage.threads.insert(ThreadRow { tid, upid: None }));
        if let Some(upid) = upid {
            storage.threads[utid].upid = Some(upid);
        }
        utid
    }

    pub fn set_process_name(&mut self, storage: &mut TraceStorage, upid: UniquePid, name: &str) {
        let name = storage.intern_string(name);
        storage.processes[upid].name = Some(name);
    }

    pub fn set_process_uid(&mut self, storage: &mut TraceStorage, upid: UniquePid, uid: Uid, app_uid_modulus: i64) {
        let row = &mut storage.processes[upid];
        row.uid = Some(uid);
        row.android_appid = Some(uid % app_uid_modulus);
    }

    pub fn uid_for(&self, storage: &TraceStorage, upid: UniquePid) -> Option<Uid> {
        storage.processes.get(upid)?.uid
    }

    pub fn add_package(&mut self, storage: &mut TraceStorage, info: &PackageInfo) {
        let name = storage.intern_string(&info.name);
        storage.packages.push(PackageRow {
            package_name: name,
            uid: info.uid,
            debuggable: info.debuggable,
            profileable_from_shell: info.profileable_from_shell,
            version_code: info.version_code,
        });
        self.packages_by_uid.entry(info.uid).or_default().push(name);
    }

    /// Packages sharing `uid`, in the order they were listed
    pub fn packages_for_uid(&self, uid: Uid) -> &[StringId] {
        self.packages_by_uid.get(&uid).map(Vec::as_slice).unwrap_or(&[])
    }
}
