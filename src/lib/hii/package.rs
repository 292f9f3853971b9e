// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::collections::HashMap;
use std::fs;
use std::io::Seek;

use anyhow::Context;
use anyhow::Result;
use binrw::io::Cursor;
use binrw::io::SeekFrom;
use binrw::BinRead;
use binrw::BinReaderExt;
use log::debug;
use log::error;

use crate::hii::model::Guid;
use crate::hii::strings;

#[derive(BinRead, Debug, PartialEq)]
#[br(little)]
struct PackageList {
    guid: Guid,  // 16 bytes
    length: u32, // 4 bytes
    #[br(count = length - 16 - 4)]
    data: Vec<u8>,
}

#[derive(BinRead, Debug, PartialEq)]
#[br(little)]
struct Package {
    // we need only 24 bits for length but are reading as u32 so discard the rest
    #[br(map = |x: u32| x  & 0x00FFFFFF)]
    length: u32,
    // now move cursor back by 32 - 24 = 8 bits = 1 byte
    #[br(seek_before = SeekFrom::Current(-1))]
    package_type: PackageType, // 8 bits
    #[br(count = length - 4)]
    data: Vec<u8>,
}

// UEFI Spec v2.9 Page 1790
#[derive(BinRead, Debug, PartialEq)]
#[br(little)]
enum PackageType {
    #[br(magic = 0x01u8)]
    Guid,
    #[br(magic = 0x02u8)]
    Form,
    #[br(magic = 0x03u8)]
    KeyboardLayout,
    #[br(magic = 0x04u8)]
    Strings,
    #[br(magic = 0x05u8)]
    Fonts,
    #[br(magic = 0x06u8)]
    Images,
    #[br(magic = 0x07u8)]
    SimpleFonts,
    #[br(magic = 0x08u8)]
    DevicePath,
    #[br(magic = 0xDFu8)]
    End,
    Unknown(u8),
}

fn get_package_lists(source: &[u8]) -> Result<Vec<PackageList>> {
    let mut db_cursor = Cursor::new(&source);

    let mut package_lists: Vec<PackageList> = Vec::new();

    let db_size: u64 = source
        .len()
        .try_into()
        .context("failed to convert buffer size into u64")?;
    debug!("Size of db is {} bytes", db_size);

    let mut used_bytes = db_cursor
        .stream_position()
        .context("failed to find current position of db_cursor")?;

    while used_bytes < db_size {
        let package_list: PackageList = match db_cursor.read_ne() {
            Err(why) => {
                error!("Can't parse more package lists: {}", why);
                // We can also break to skip the error and return the already parsed package lists.
                return Err(why.into());
            }
            Ok(p) => p,
        };
        debug!("Package List GUID is {}", package_list.guid);
        package_lists.push(package_list);

        used_bytes = db_cursor
            .stream_position()
            .context("failed to find current position of db_cursor")?;
        debug!("Current db_cursor stream position is {}", used_bytes);
    }

    Ok(package_lists)
}

fn get_packages(package_list: &PackageList) -> Result<Vec<Package>> {
    let mut packages: Vec<Package> = Vec::new(); // packages of one package_list

    let mut pl_cursor = Cursor::new(&package_list.data);

    loop {
        let package: Package = match pl_cursor.read_ne() {
            Err(why) => {
                error!("Can't parse more packages in this package list {}", why);
                // We can also break to skip the error and save correctly parsed packages.
                return Err(why.into());
            }
            Ok(p) => p,
        };

        debug!(
            "Package List {}. This package type is {:?}",
            package_list.guid, package.package_type
        );
        if package.package_type == PackageType::End {
            break;
        }
        packages.push(package);
    }

    Ok(packages)
}

type StringMap = HashMap<i32, String>;

/// One form package's raw opcode bytes plus the HII handle its package list
/// was assigned, ready to hand to [`crate::hii::parser::parse_form_set`]
/// (the uniquing rule in spec §3 needs that handle, not just the bytes).
pub struct RawFormPackage {
    pub hii_handle: u32,
    pub bytes: Vec<u8>,
}

/// ParsedHiiDB is the 'result' superstruct which will
/// hold the results of our parsed strings and forms packages.
pub struct ParsedHiiDB {
    /// HashMap<packagelist_guid_string, Vec<StringMap>>
    /// for each packagelist the key = packagelist guid string and val = vector of string package hashmaps
    /// each string package hashmap here has its key = string id and val = the string
    pub strings: HashMap<String, Vec<StringMap>>,
    /// Raw form-package bytes per package list, left unparsed here --
    /// `hii::parser::parse_form_set` is the one place that turns these into
    /// a `FormSet`, since the parser needs an explicit `expected_guid` and
    /// `hii_handle` that only the caller of this module knows how to pick.
    pub forms: HashMap<String, Vec<RawFormPackage>>,
}

/// read_db input (source) is a vector of u8 bytes
/// In hiidb, we have package lists (with unique guids) which have multiple packages of different types including string, form and end type packages.
/// For every package list, we will parse different packages. If package type is
/// * string -> parse and save data
/// * form -> save its raw bytes for the caller to hand to the form-set parser
/// * something else (like fonts or animations) -> we don't care about them, so continue to the next package in the package list.
/// In the end return a ParsedHiiDB struct which will have the parsed and saved data.
pub fn read_db(source: &[u8]) -> Result<ParsedHiiDB> {
    let mut res = ParsedHiiDB {
        strings: HashMap::new(),
        forms: HashMap::new(),
    };

    for package_list in get_package_lists(source)? {
        let package_list_guid = package_list.guid.to_string();
        // The package list's own GUID doubles as a stable per-handle tag for
        // the storage-uniquing registry (spec §3); every form package drawn
        // from this list shares it.
        let hii_handle = package_list.guid.data1;

        // once filled this will have string maps from each string package in the package list.
        let mut package_list_string_maps: Vec<StringMap> = Vec::new();
        let mut raw_forms: Vec<RawFormPackage> = Vec::new();

        for package in get_packages(&package_list)? {
            let mut package_cursor = Cursor::new(&package.data);

            match package.package_type {
                PackageType::Strings => match strings::handle_string_package(&mut package_cursor) {
                    Ok(string_map) => package_list_string_maps.push(string_map),
                    Err(why) => {
                        error!("Can't parse as string header {}", why);
                        // We can also continue to ignore the error because we already know the bounds of each package so we can skip to the next one.
                        return Err(why);
                    }
                },
                PackageType::Form => raw_forms.push(RawFormPackage { hii_handle, bytes: package.data }),
                _ => continue,
            }
        }

        if !package_list_string_maps.is_empty() {
            res.strings
                .insert(package_list_guid.clone(), package_list_string_maps);
        }
        if !raw_forms.is_empty() {
            res.forms.insert(package_list_guid, raw_forms);
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Read;

    use super::*;

    #[test]
    fn test_read_db_strings() {
        let file_path = "testdata/hiidb.bin";
        if !fs::metadata(file_path).is_ok() {
            // The BIOS firmware we tested on was proprietary, thus I'm not sure we're allowed to share even the HiiDB. Keeping the test here for anybody how has the HiiDB this is tested on; or feel free to modify the test to use GALAGOPRO or any other free UEFI firmware.
            return;
        }
        let mut file = File::open(file_path).unwrap();
        let mut file_contents = Vec::new();
        file.read_to_end(&mut file_contents).unwrap();
        let res = read_db(&file_contents).unwrap();

        // compare number of package lists which have string type packages
        assert_eq!(res.strings.len(), 12);

        // compare a certain string
        assert_eq!(
            res.strings
                .get("ABBCE13D-E25A-4D9F-A1F9-2F7710786892")
                .unwrap()
                .get(0)
                .unwrap()
                .get(&8)
                .unwrap(),
            "MMIO Low Base"
        );

        // compare number of strings in the 0 indexed (1st) package of given package list
        assert_eq!(
            res.strings
                .get("ABBCE13D-E25A-4D9F-A1F9-2F7710786892")
                .unwrap()
                .get(0)
                .unwrap()
                .len(),
            5714
        );

        // compare number of string packages in this package list
        assert_eq!(
            res.strings
                .get("ABBCE13D-E25A-4D9F-A1F9-2F7710786892")
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_read_db_forms() {
        let file_path = "testdata/hiidb.bin";
        if !fs::metadata(file_path).is_ok() {
            // The BIOS firmware we tested on was proprietary, thus I'm not sure we're allowed to share even the HiiDB. Keeping the test here for anybody how has the HiiDB this is tested on; or feel free to modify the test to use GALAGOPRO or any other free UEFI firmware.
            return;
        }
        let mut file = File::open(file_path).unwrap();
        let mut file_contents = Vec::new();
        file.read_to_end(&mut file_contents).unwrap();
        let res = read_db(&file_contents).unwrap();

        let raw_form = res
            .forms
            .get("ABBCE13D-E25A-4D9F-A1F9-2F7710786892")
            .unwrap()
            .get(0)
            .unwrap();

        let formset = crate::hii::parser::parse_form_set(&raw_form.bytes, None, raw_form.hii_handle).unwrap();
        assert!(!formset.forms.is_empty());
    }
}
